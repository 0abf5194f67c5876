use std::pin::Pin;

use futures::Stream;
use tonic::{Request, Response, Status};

use proto::projectile::{
    polls_service_server::PollsService, CreatePollParams, OptionId, Poll as ProtoPoll,
    PollId, PollOption as ProtoPollOption, ProjectId,
};

use crate::controllers::{caller_id, reject};
use crate::db::authz::{require_role, Role};
use crate::db::connection::PgPool;
use crate::db::repos::poll;
use crate::db::repos::poll::PollDetail;
use crate::error::AppError;

pub struct PollsController {
    pub pool: PgPool,
}

fn to_proto(detail: &PollDetail) -> ProtoPoll {
    ProtoPoll {
        id: detail.poll.id.clone(),
        project_id: detail.poll.project_id.clone(),
        title: detail.poll.title.clone(),
        options: detail
            .options
            .iter()
            .map(|(option, voted_by)| ProtoPollOption {
                id: option.id.clone(),
                poll_id: option.poll_id.clone(),
                title: option.title.clone(),
                sort_order: option.sort_order,
                voted_by: voted_by.clone(),
            })
            .collect(),
    }
}

impl PollsController {
    fn try_create(&self, caller: &str, data: &CreatePollParams) -> Result<ProtoPoll, AppError> {
        if data.title.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "title: must not be empty".to_string(),
            ));
        }
        let conn = self.pool.get()?;
        require_role(&conn, &data.project_id, caller, Role::Member)?;
        let created = poll::create(&conn, &data.project_id, &data.title, &data.option_titles)?;
        Ok(to_proto(&created))
    }

    fn try_list(&self, caller: &str, project_id: &str) -> Result<Vec<ProtoPoll>, AppError> {
        let conn = self.pool.get()?;
        require_role(&conn, project_id, caller, Role::Member)?;
        let details = poll::list_for_project(&conn, project_id)?;
        Ok(details.iter().map(to_proto).collect())
    }

    fn try_delete(&self, caller: &str, poll_id: &str) -> Result<ProtoPoll, AppError> {
        let conn = self.pool.get()?;
        let existing = poll::detail(&conn, poll_id)?;
        require_role(&conn, &existing.poll.project_id, caller, Role::Member)?;
        poll::remove(&conn, poll_id)?;
        Ok(to_proto(&existing))
    }

    fn try_vote(&self, caller: &str, option_id: &str) -> Result<ProtoPoll, AppError> {
        let conn = self.pool.get()?;
        let option = poll::load_option(&conn, option_id)?;
        let owning_poll = poll::load(&conn, &option.poll_id)?;
        require_role(&conn, &owning_poll.project_id, caller, Role::Member)?;
        let detail = poll::vote(&conn, option_id, caller)?;
        Ok(to_proto(&detail))
    }
}

#[tonic::async_trait]
impl PollsService for PollsController {
    async fn create_poll(
        &self,
        request: Request<CreatePollParams>,
    ) -> Result<Response<ProtoPoll>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_create(&caller, request.get_ref())
            .map_err(|err| reject("create_poll", err))?;
        Ok(Response::new(reply))
    }

    type ListPollsStream = Pin<Box<dyn Stream<Item = Result<ProtoPoll, Status>> + Send>>;

    async fn list_polls(
        &self,
        request: Request<ProjectId>,
    ) -> Result<Response<Self::ListPollsStream>, Status> {
        let caller = caller_id(&request)?;
        let listed = self
            .try_list(&caller, &request.get_ref().project_id)
            .map_err(|err| reject("list_polls", err))?;
        let stream = tokio_stream::iter(listed.into_iter().map(Ok::<_, Status>));
        Ok(Response::new(Box::pin(stream) as Self::ListPollsStream))
    }

    async fn delete_poll(
        &self,
        request: Request<PollId>,
    ) -> Result<Response<ProtoPoll>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_delete(&caller, &request.get_ref().poll_id)
            .map_err(|err| reject("delete_poll", err))?;
        Ok(Response::new(reply))
    }

    async fn vote(&self, request: Request<OptionId>) -> Result<Response<ProtoPoll>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_vote(&caller, &request.get_ref().option_id)
            .map_err(|err| reject("vote", err))?;
        Ok(Response::new(reply))
    }
}

use std::pin::Pin;

use futures::Stream;
use tonic::{transport::Channel, Code, Request, Response, Status};

use proto::objectstore::{object_storage_service_client::ObjectStorageServiceClient, ObjectKey};
use proto::projectile::{
    projects_service_server::ProjectsService, CreateProjectParams, Empty, InvitePassword,
    JoinProjectParams, Project as ProtoProject, ProjectId, ProjectIdAndUserId, SignedUrl,
    UpdateProjectParams,
};

use crate::controllers::{caller_id, from_proto_time, reject, to_proto_time};
use crate::db::authz::{require_role, Role};
use crate::db::connection::PgPool;
use crate::db::models::ProjectChangeSet;
use crate::db::repos::project::ProjectDetail;
use crate::db::repos::{file, project};
use crate::error::AppError;

pub struct ProjectsController {
    pub pool: PgPool,
    pub object_store: ObjectStorageServiceClient<Channel>,
}

/// The invite password only travels to the leader.
fn to_proto(detail: &ProjectDetail, caller: &str) -> ProtoProject {
    ProtoProject {
        id: detail.project.id.clone(),
        name: detail.project.name.clone(),
        description: detail.project.description.clone(),
        due_date: detail.project.due_date.map(to_proto_time),
        leader_id: detail.project.leader_id.clone(),
        member_ids: detail.member_ids.clone(),
        thumbnail_key: detail.project.thumbnail_key.clone(),
        invite_password: (caller == detail.project.leader_id)
            .then(|| detail.project.invite_password.clone()),
    }
}

impl ProjectsController {
    fn try_create(
        &self,
        caller: &str,
        data: &CreateProjectParams,
    ) -> Result<ProtoProject, AppError> {
        if data.name.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "name: must not be empty".to_string(),
            ));
        }
        let conn = self.pool.get()?;
        let due_date = data.due_date.as_ref().map(from_proto_time).transpose()?;
        let detail = project::create(&conn, caller, &data.name, &data.description, due_date)?;
        Ok(to_proto(&detail, caller))
    }

    fn try_create_demo(&self, caller: &str) -> Result<ProtoProject, AppError> {
        let conn = self.pool.get()?;
        let detail = project::create_demo(&conn, caller)?;
        Ok(to_proto(&detail, caller))
    }

    fn try_get(&self, caller: &str, project_id: &str) -> Result<ProtoProject, AppError> {
        let conn = self.pool.get()?;
        require_role(&conn, project_id, caller, Role::Member)?;
        Ok(to_proto(&project::detail(&conn, project_id)?, caller))
    }

    fn try_list(&self, caller: &str) -> Result<Vec<ProtoProject>, AppError> {
        let conn = self.pool.get()?;
        let details = project::list_for_member(&conn, caller)?;
        Ok(details
            .iter()
            .map(|detail| to_proto(detail, caller))
            .collect())
    }

    fn try_update(
        &self,
        caller: &str,
        data: &UpdateProjectParams,
    ) -> Result<ProtoProject, AppError> {
        if let Some(name) = &data.name {
            if name.trim().is_empty() {
                return Err(AppError::InvalidArgument(
                    "name: must not be empty".to_string(),
                ));
            }
        }
        let conn = self.pool.get()?;
        require_role(&conn, &data.project_id, caller, Role::Leader)?;
        let change_set = ProjectChangeSet {
            name: data.name.clone(),
            description: data.description.clone(),
        };
        let due_date = if data.clear_due_date {
            Some(None)
        } else {
            data.due_date
                .as_ref()
                .map(|t| from_proto_time(t).map(Some))
                .transpose()?
        };
        let detail = project::update_metadata(&conn, &data.project_id, change_set, due_date)?;
        Ok(to_proto(&detail, caller))
    }

    async fn try_delete(&self, caller: &str, project_id: &str) -> Result<ProtoProject, AppError> {
        let object_keys = {
            let conn = self.pool.get()?;
            let access = require_role(&conn, project_id, caller, Role::Leader)?;
            let mut keys = Vec::new();
            if access.project.thumbnail_key.is_some() {
                keys.push(file::thumbnail_key(project_id));
            }
            for stored in file::list_for_project(&conn, project_id)? {
                keys.push(file::object_key(project_id, &stored.id));
            }
            keys
        };

        // Storage objects go first; a row without an object is worse than an
        // object without a row, and the row delete below cascades every child.
        self.delete_objects(object_keys).await?;

        let conn = self.pool.get()?;
        let dropped = project::remove(&conn, project_id)?;
        Ok(to_proto(&dropped, caller))
    }

    fn try_join(&self, caller: &str, data: &JoinProjectParams) -> Result<ProtoProject, AppError> {
        let conn = self.pool.get()?;
        let detail = project::join(&conn, &data.project_id, caller, &data.invite_password)?;
        Ok(to_proto(&detail, caller))
    }

    fn try_transfer(
        &self,
        caller: &str,
        data: &ProjectIdAndUserId,
    ) -> Result<ProtoProject, AppError> {
        let conn = self.pool.get()?;
        require_role(&conn, &data.project_id, caller, Role::Leader)?;
        let detail = project::transfer_leadership(&conn, &data.project_id, &data.user_id)?;
        Ok(to_proto(&detail, caller))
    }

    fn try_remove_member(
        &self,
        caller: &str,
        data: &ProjectIdAndUserId,
    ) -> Result<ProtoProject, AppError> {
        let conn = self.pool.get()?;
        // Anyone may leave; removing someone else takes the leader.
        let required = if data.user_id == caller {
            Role::Member
        } else {
            Role::Leader
        };
        require_role(&conn, &data.project_id, caller, required)?;
        let detail = project::remove_member(&conn, &data.project_id, &data.user_id)?;
        Ok(to_proto(&detail, caller))
    }

    fn try_regenerate(&self, caller: &str, project_id: &str) -> Result<InvitePassword, AppError> {
        let conn = self.pool.get()?;
        require_role(&conn, project_id, caller, Role::Leader)?;
        let invite_password = project::regenerate_invite_password(&conn, project_id)?;
        Ok(InvitePassword { invite_password })
    }

    async fn try_thumbnail_url(
        &self,
        caller: &str,
        project_id: &str,
    ) -> Result<SignedUrl, AppError> {
        {
            let conn = self.pool.get()?;
            require_role(&conn, project_id, caller, Role::Leader)?;
        }
        let key = file::thumbnail_key(project_id);
        let mut store = self.object_store.clone();
        let url = store
            .sign_upload_url(ObjectKey { key: key.clone() })
            .await?
            .into_inner()
            .url;
        let conn = self.pool.get()?;
        project::set_thumbnail_key(&conn, project_id, &key)?;
        Ok(SignedUrl { url })
    }

    async fn delete_objects(&self, keys: Vec<String>) -> Result<(), AppError> {
        let mut store = self.object_store.clone();
        for key in keys {
            match store.delete_object(ObjectKey { key }).await {
                Ok(_) => {}
                // Already gone upstream is as good as deleted.
                Err(status) if status.code() == Code::NotFound => {}
                Err(status) => return Err(AppError::ObjectStore(status)),
            }
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl ProjectsService for ProjectsController {
    async fn create_project(
        &self,
        request: Request<CreateProjectParams>,
    ) -> Result<Response<ProtoProject>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_create(&caller, request.get_ref())
            .map_err(|err| reject("create_project", err))?;
        Ok(Response::new(reply))
    }

    async fn create_demo_project(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<ProtoProject>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_create_demo(&caller)
            .map_err(|err| reject("create_demo_project", err))?;
        Ok(Response::new(reply))
    }

    async fn get_project(
        &self,
        request: Request<ProjectId>,
    ) -> Result<Response<ProtoProject>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_get(&caller, &request.get_ref().project_id)
            .map_err(|err| reject("get_project", err))?;
        Ok(Response::new(reply))
    }

    type ListProjectsStream = Pin<Box<dyn Stream<Item = Result<ProtoProject, Status>> + Send>>;

    async fn list_projects(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<Self::ListProjectsStream>, Status> {
        let caller = caller_id(&request)?;
        let projects = self
            .try_list(&caller)
            .map_err(|err| reject("list_projects", err))?;
        let stream = tokio_stream::iter(projects.into_iter().map(Ok::<_, Status>));
        Ok(Response::new(Box::pin(stream) as Self::ListProjectsStream))
    }

    async fn update_project(
        &self,
        request: Request<UpdateProjectParams>,
    ) -> Result<Response<ProtoProject>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_update(&caller, request.get_ref())
            .map_err(|err| reject("update_project", err))?;
        Ok(Response::new(reply))
    }

    async fn delete_project(
        &self,
        request: Request<ProjectId>,
    ) -> Result<Response<ProtoProject>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_delete(&caller, &request.get_ref().project_id)
            .await
            .map_err(|err| reject("delete_project", err))?;
        Ok(Response::new(reply))
    }

    async fn join_project(
        &self,
        request: Request<JoinProjectParams>,
    ) -> Result<Response<ProtoProject>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_join(&caller, request.get_ref())
            .map_err(|err| reject("join_project", err))?;
        Ok(Response::new(reply))
    }

    async fn transfer_leadership(
        &self,
        request: Request<ProjectIdAndUserId>,
    ) -> Result<Response<ProtoProject>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_transfer(&caller, request.get_ref())
            .map_err(|err| reject("transfer_leadership", err))?;
        Ok(Response::new(reply))
    }

    async fn remove_member(
        &self,
        request: Request<ProjectIdAndUserId>,
    ) -> Result<Response<ProtoProject>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_remove_member(&caller, request.get_ref())
            .map_err(|err| reject("remove_member", err))?;
        Ok(Response::new(reply))
    }

    async fn regenerate_invite_password(
        &self,
        request: Request<ProjectId>,
    ) -> Result<Response<InvitePassword>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_regenerate(&caller, &request.get_ref().project_id)
            .map_err(|err| reject("regenerate_invite_password", err))?;
        Ok(Response::new(reply))
    }

    async fn thumbnail_upload_url(
        &self,
        request: Request<ProjectId>,
    ) -> Result<Response<SignedUrl>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_thumbnail_url(&caller, &request.get_ref().project_id)
            .await
            .map_err(|err| reject("thumbnail_upload_url", err))?;
        Ok(Response::new(reply))
    }
}

use std::pin::Pin;

use futures::Stream;
use tonic::{Request, Response, Status};

use proto::projectile::{
    threads_service_server::ThreadsService, CreateReplyParams, CreateThreadParams, ProjectId,
    ReplyId, Thread as ProtoThread, ThreadId, ThreadReply as ProtoThreadReply,
    ThreadWithReplies, UpdateReplyParams, UpdateThreadParams,
};

use crate::controllers::{caller_id, reject, to_proto_time};
use crate::db::authz::{require_role, Role};
use crate::db::connection::PgPool;
use crate::db::models::{Thread, ThreadReply};
use crate::db::repos::thread;
use crate::error::AppError;

pub struct ThreadsController {
    pub pool: PgPool,
}

fn thread_to_proto(thread: &Thread) -> ProtoThread {
    ProtoThread {
        id: thread.id.clone(),
        project_id: thread.project_id.clone(),
        author_id: thread.author_id.clone(),
        title: thread.title.clone(),
        content: thread.content.clone(),
        created_at: Some(to_proto_time(thread.created_at)),
        updated_at: Some(to_proto_time(thread.updated_at)),
    }
}

fn reply_to_proto(reply: &ThreadReply) -> ProtoThreadReply {
    ProtoThreadReply {
        id: reply.id.clone(),
        thread_id: reply.thread_id.clone(),
        parent_reply_id: reply.parent_reply_id.clone(),
        author_id: reply.author_id.clone(),
        content: reply.content.clone(),
        deleted: reply.deleted,
        created_at: Some(to_proto_time(reply.created_at)),
    }
}

fn validate_update(data: &UpdateThreadParams) -> Result<(), AppError> {
    if data.title.is_none() && data.content.is_none() {
        return Err(AppError::InvalidArgument("nothing to update".to_string()));
    }
    if let Some(title) = &data.title {
        if title.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "title: must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}

impl ThreadsController {
    fn try_create(
        &self,
        caller: &str,
        data: &CreateThreadParams,
    ) -> Result<ProtoThread, AppError> {
        if data.title.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "title: must not be empty".to_string(),
            ));
        }
        let conn = self.pool.get()?;
        require_role(&conn, &data.project_id, caller, Role::Member)?;
        let created = thread::create(&conn, &data.project_id, caller, &data.title, &data.content)?;
        Ok(thread_to_proto(&created))
    }

    fn try_list(&self, caller: &str, project_id: &str) -> Result<Vec<ProtoThread>, AppError> {
        let conn = self.pool.get()?;
        require_role(&conn, project_id, caller, Role::Member)?;
        let threads = thread::list_for_project(&conn, project_id)?;
        Ok(threads.iter().map(thread_to_proto).collect())
    }

    fn try_get(&self, caller: &str, thread_id: &str) -> Result<ThreadWithReplies, AppError> {
        let conn = self.pool.get()?;
        let existing = thread::load(&conn, thread_id)?;
        require_role(&conn, &existing.project_id, caller, Role::Member)?;
        let replies = thread::replies(&conn, thread_id)?;
        Ok(ThreadWithReplies {
            thread: Some(thread_to_proto(&existing)),
            replies: replies.iter().map(reply_to_proto).collect(),
        })
    }

    fn try_update(
        &self,
        caller: &str,
        data: &UpdateThreadParams,
    ) -> Result<ProtoThread, AppError> {
        validate_update(data)?;
        let conn = self.pool.get()?;
        let existing = thread::load(&conn, &data.thread_id)?;
        let access = require_role(&conn, &existing.project_id, caller, Role::Member)?;
        if existing.author_id != caller && access.project.leader_id != caller {
            return Err(AppError::PermissionDenied(
                "only the author or the project leader may edit a thread",
            ));
        }
        let updated = thread::update_content(
            &conn,
            &data.thread_id,
            data.title.clone(),
            data.content.clone(),
        )?;
        Ok(thread_to_proto(&updated))
    }

    fn try_delete(&self, caller: &str, thread_id: &str) -> Result<ProtoThread, AppError> {
        let conn = self.pool.get()?;
        let existing = thread::load(&conn, thread_id)?;
        let access = require_role(&conn, &existing.project_id, caller, Role::Member)?;
        if existing.author_id != caller && access.project.leader_id != caller {
            return Err(AppError::PermissionDenied(
                "only the author or the project leader may delete a thread",
            ));
        }
        let dropped = thread::remove(&conn, thread_id)?;
        Ok(thread_to_proto(&dropped))
    }

    fn try_create_reply(
        &self,
        caller: &str,
        data: &CreateReplyParams,
    ) -> Result<ProtoThreadReply, AppError> {
        if data.content.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "content: must not be empty".to_string(),
            ));
        }
        let conn = self.pool.get()?;
        let owning_thread = thread::load(&conn, &data.thread_id)?;
        require_role(&conn, &owning_thread.project_id, caller, Role::Member)?;
        let created = thread::create_reply(
            &conn,
            &data.thread_id,
            data.parent_reply_id.as_deref(),
            caller,
            &data.content,
        )?;
        Ok(reply_to_proto(&created))
    }

    fn try_update_reply(
        &self,
        caller: &str,
        data: &UpdateReplyParams,
    ) -> Result<ProtoThreadReply, AppError> {
        if data.content.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "content: must not be empty".to_string(),
            ));
        }
        let conn = self.pool.get()?;
        let existing = thread::load_reply(&conn, &data.reply_id)?;
        let owning_thread = thread::load(&conn, &existing.thread_id)?;
        require_role(&conn, &owning_thread.project_id, caller, Role::Member)?;
        if existing.author_id != caller {
            return Err(AppError::PermissionDenied(
                "only the author may edit a reply",
            ));
        }
        if existing.deleted {
            return Err(AppError::FailedPrecondition(
                "a deleted reply cannot be edited".to_string(),
            ));
        }
        let updated = thread::update_reply(&conn, &data.reply_id, &data.content)?;
        Ok(reply_to_proto(&updated))
    }

    fn try_delete_reply(
        &self,
        caller: &str,
        reply_id: &str,
    ) -> Result<ProtoThreadReply, AppError> {
        let conn = self.pool.get()?;
        let existing = thread::load_reply(&conn, reply_id)?;
        let owning_thread = thread::load(&conn, &existing.thread_id)?;
        let access = require_role(&conn, &owning_thread.project_id, caller, Role::Member)?;
        if existing.author_id != caller && access.project.leader_id != caller {
            return Err(AppError::PermissionDenied(
                "only the author or the project leader may delete a reply",
            ));
        }
        let removed = thread::remove_reply(&conn, reply_id)?;
        Ok(reply_to_proto(&removed))
    }
}

#[tonic::async_trait]
impl ThreadsService for ThreadsController {
    async fn create_thread(
        &self,
        request: Request<CreateThreadParams>,
    ) -> Result<Response<ProtoThread>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_create(&caller, request.get_ref())
            .map_err(|err| reject("create_thread", err))?;
        Ok(Response::new(reply))
    }

    type ListThreadsStream = Pin<Box<dyn Stream<Item = Result<ProtoThread, Status>> + Send>>;

    async fn list_threads(
        &self,
        request: Request<ProjectId>,
    ) -> Result<Response<Self::ListThreadsStream>, Status> {
        let caller = caller_id(&request)?;
        let threads = self
            .try_list(&caller, &request.get_ref().project_id)
            .map_err(|err| reject("list_threads", err))?;
        let stream = tokio_stream::iter(threads.into_iter().map(Ok::<_, Status>));
        Ok(Response::new(Box::pin(stream) as Self::ListThreadsStream))
    }

    async fn get_thread(
        &self,
        request: Request<ThreadId>,
    ) -> Result<Response<ThreadWithReplies>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_get(&caller, &request.get_ref().thread_id)
            .map_err(|err| reject("get_thread", err))?;
        Ok(Response::new(reply))
    }

    async fn update_thread(
        &self,
        request: Request<UpdateThreadParams>,
    ) -> Result<Response<ProtoThread>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_update(&caller, request.get_ref())
            .map_err(|err| reject("update_thread", err))?;
        Ok(Response::new(reply))
    }

    async fn delete_thread(
        &self,
        request: Request<ThreadId>,
    ) -> Result<Response<ProtoThread>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_delete(&caller, &request.get_ref().thread_id)
            .map_err(|err| reject("delete_thread", err))?;
        Ok(Response::new(reply))
    }

    async fn create_reply(
        &self,
        request: Request<CreateReplyParams>,
    ) -> Result<Response<ProtoThreadReply>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_create_reply(&caller, request.get_ref())
            .map_err(|err| reject("create_reply", err))?;
        Ok(Response::new(reply))
    }

    async fn update_reply(
        &self,
        request: Request<UpdateReplyParams>,
    ) -> Result<Response<ProtoThreadReply>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_update_reply(&caller, request.get_ref())
            .map_err(|err| reject("update_reply", err))?;
        Ok(Response::new(reply))
    }

    async fn delete_reply(
        &self,
        request: Request<ReplyId>,
    ) -> Result<Response<ProtoThreadReply>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_delete_reply(&caller, &request.get_ref().reply_id)
            .map_err(|err| reject("delete_reply", err))?;
        Ok(Response::new(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(title: Option<&str>, content: Option<&str>) -> UpdateThreadParams {
        UpdateThreadParams {
            thread_id: "thread-1".to_string(),
            title: title.map(str::to_owned),
            content: content.map(str::to_owned),
        }
    }

    #[test]
    fn edit_with_no_fields_is_rejected() {
        assert!(matches!(
            validate_update(&params(None, None)),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn edits_cannot_blank_the_title() {
        assert!(matches!(
            validate_update(&params(Some("  "), None)),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(validate_update(&params(Some("new title"), None)).is_ok());
        assert!(validate_update(&params(None, Some("new body"))).is_ok());
    }
}

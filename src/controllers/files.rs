use std::pin::Pin;

use futures::Stream;
use tonic::{transport::Channel, Code, Request, Response, Status};
use tracing::warn;

use proto::objectstore::{object_storage_service_client::ObjectStorageServiceClient, ObjectKey};
use proto::projectile::{
    files_service_server::FilesService, File as ProtoFile, FileId, FileIdAndName, FileUpload,
    ProjectId, ProjectIdAndFileName, SignedUrl,
};

use crate::controllers::{caller_id, reject, to_proto_time};
use crate::db::authz::{require_role, Role};
use crate::db::connection::PgPool;
use crate::db::models::StoredFile;
use crate::db::repos::file;
use crate::error::AppError;

pub struct FilesController {
    pub pool: PgPool,
    pub object_store: ObjectStorageServiceClient<Channel>,
}

fn to_proto(stored: &StoredFile) -> ProtoFile {
    ProtoFile {
        id: stored.id.clone(),
        project_id: stored.project_id.clone(),
        file_name: stored.file_name.clone(),
        uploaded_by: stored.uploaded_by.clone(),
        created_at: Some(to_proto_time(stored.created_at)),
    }
}

impl FilesController {
    /// Creates the record, then asks the store for an upload URL. A failed
    /// signing call deletes the just-created row again so no record exists
    /// without a reachable object.
    async fn try_request_upload(
        &self,
        caller: &str,
        data: &ProjectIdAndFileName,
    ) -> Result<FileUpload, AppError> {
        if data.file_name.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "file_name: must not be empty".to_string(),
            ));
        }
        let created = {
            let conn = self.pool.get()?;
            require_role(&conn, &data.project_id, caller, Role::Member)?;
            file::create(&conn, &data.project_id, caller, &data.file_name)?
        };

        let key = file::object_key(&created.project_id, &created.id);
        let mut store = self.object_store.clone();
        match store.sign_upload_url(ObjectKey { key }).await {
            Ok(response) => Ok(FileUpload {
                file: Some(to_proto(&created)),
                upload_url: response.into_inner().url,
            }),
            Err(status) => {
                let conn = self.pool.get()?;
                if let Err(cleanup) = file::remove(&conn, &created.id) {
                    warn!(
                        "failed to compensate file record {} after signing error: {}",
                        created.id, cleanup
                    );
                }
                Err(AppError::ObjectStore(status))
            }
        }
    }

    fn try_list(&self, caller: &str, project_id: &str) -> Result<Vec<ProtoFile>, AppError> {
        let conn = self.pool.get()?;
        require_role(&conn, project_id, caller, Role::Member)?;
        let stored = file::list_for_project(&conn, project_id)?;
        Ok(stored.iter().map(to_proto).collect())
    }

    async fn try_download_url(&self, caller: &str, file_id: &str) -> Result<SignedUrl, AppError> {
        let key = {
            let conn = self.pool.get()?;
            let stored = file::load(&conn, file_id)?;
            require_role(&conn, &stored.project_id, caller, Role::Member)?;
            file::object_key(&stored.project_id, &stored.id)
        };
        let mut store = self.object_store.clone();
        let url = store
            .sign_download_url(ObjectKey { key })
            .await?
            .into_inner()
            .url;
        Ok(SignedUrl { url })
    }

    fn try_rename(&self, caller: &str, data: &FileIdAndName) -> Result<ProtoFile, AppError> {
        if data.file_name.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "file_name: must not be empty".to_string(),
            ));
        }
        let conn = self.pool.get()?;
        let stored = file::load(&conn, &data.file_id)?;
        require_role(&conn, &stored.project_id, caller, Role::Member)?;
        let renamed = file::rename(&conn, &data.file_id, &data.file_name)?;
        Ok(to_proto(&renamed))
    }

    /// The stored object goes first; only once the store no longer holds the
    /// bytes does the record disappear.
    async fn try_delete(&self, caller: &str, file_id: &str) -> Result<ProtoFile, AppError> {
        let key = {
            let conn = self.pool.get()?;
            let stored = file::load(&conn, file_id)?;
            require_role(&conn, &stored.project_id, caller, Role::Member)?;
            file::object_key(&stored.project_id, &stored.id)
        };
        let mut store = self.object_store.clone();
        match store.delete_object(ObjectKey { key }).await {
            Ok(_) => {}
            Err(status) if status.code() == Code::NotFound => {}
            Err(status) => return Err(AppError::ObjectStore(status)),
        }
        let conn = self.pool.get()?;
        let dropped = file::remove(&conn, file_id)?;
        Ok(to_proto(&dropped))
    }
}

#[tonic::async_trait]
impl FilesService for FilesController {
    async fn request_upload(
        &self,
        request: Request<ProjectIdAndFileName>,
    ) -> Result<Response<FileUpload>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_request_upload(&caller, request.get_ref())
            .await
            .map_err(|err| reject("request_upload", err))?;
        Ok(Response::new(reply))
    }

    type ListFilesStream = Pin<Box<dyn Stream<Item = Result<ProtoFile, Status>> + Send>>;

    async fn list_files(
        &self,
        request: Request<ProjectId>,
    ) -> Result<Response<Self::ListFilesStream>, Status> {
        let caller = caller_id(&request)?;
        let listed = self
            .try_list(&caller, &request.get_ref().project_id)
            .map_err(|err| reject("list_files", err))?;
        let stream = tokio_stream::iter(listed.into_iter().map(Ok::<_, Status>));
        Ok(Response::new(Box::pin(stream) as Self::ListFilesStream))
    }

    async fn download_url(
        &self,
        request: Request<FileId>,
    ) -> Result<Response<SignedUrl>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_download_url(&caller, &request.get_ref().file_id)
            .await
            .map_err(|err| reject("download_url", err))?;
        Ok(Response::new(reply))
    }

    async fn rename_file(
        &self,
        request: Request<FileIdAndName>,
    ) -> Result<Response<ProtoFile>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_rename(&caller, request.get_ref())
            .map_err(|err| reject("rename_file", err))?;
        Ok(Response::new(reply))
    }

    async fn delete_file(
        &self,
        request: Request<FileId>,
    ) -> Result<Response<ProtoFile>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_delete(&caller, &request.get_ref().file_id)
            .await
            .map_err(|err| reject("delete_file", err))?;
        Ok(Response::new(reply))
    }
}

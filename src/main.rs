#[macro_use]
extern crate diesel;

mod controllers;
mod db;
mod error;
mod ordering;

use std::env;

use dotenv::dotenv;
use proto::objectstore::object_storage_service_client::ObjectStorageServiceClient;
use proto::projectile::{
    board_service_server::BoardServiceServer, files_service_server::FilesServiceServer,
    polls_service_server::PollsServiceServer, projects_service_server::ProjectsServiceServer,
    threads_service_server::ThreadsServiceServer,
};
use tonic::transport::{Channel, Server};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::controllers::{
    board::BoardController, files::FilesController, polls::PollsController,
    projects::ProjectsController, threads::ThreadsController,
};
use crate::db::connection::establish_connection;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app_url = env::var("APP_URL")?.parse()?;
    let object_store_url = env::var("OBJECT_STORE_URL")?;

    let pool = establish_connection()?;
    let object_store: ObjectStorageServiceClient<Channel> =
        ObjectStorageServiceClient::connect(object_store_url).await?;

    let projects_controller = ProjectsController {
        pool: pool.clone(),
        object_store: object_store.clone(),
    };
    let board_controller = BoardController { pool: pool.clone() };
    let threads_controller = ThreadsController { pool: pool.clone() };
    let files_controller = FilesController {
        pool: pool.clone(),
        object_store,
    };
    let polls_controller = PollsController { pool };

    info!("projectile service listening on {}", app_url);
    Server::builder()
        .add_service(ProjectsServiceServer::new(projects_controller))
        .add_service(BoardServiceServer::new(board_controller))
        .add_service(ThreadsServiceServer::new(threads_controller))
        .add_service(FilesServiceServer::new(files_controller))
        .add_service(PollsServiceServer::new(polls_controller))
        .serve(app_url)
        .await?;

    Ok(())
}

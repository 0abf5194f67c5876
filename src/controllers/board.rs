use tonic::{Request, Response, Status};

use proto::projectile::{
    board_service_server::BoardService, Board as ProtoBoard, ColumnId, ColumnIdAndName,
    CreateTaskParams, KanbanColumn as ProtoKanbanColumn, MoveTaskParams, ProjectId,
    ProjectIdAndColumnName, ReorderColumnsParams, Task as ProtoTask, TaskId, TaskIdAndUserId,
    UpdateTaskParams,
};

use crate::controllers::{caller_id, from_proto_time, reject, to_proto_time};
use crate::db::authz::{require_role, Role};
use crate::db::connection::PgPool;
use crate::db::models::{KanbanColumn, Task, TaskChangeSet};
use crate::db::repos::column::BoardColumn;
use crate::db::repos::{column, task};
use crate::error::AppError;

pub struct BoardController {
    pub pool: PgPool,
}

fn task_to_proto(task: &Task, assignee_ids: &[String]) -> ProtoTask {
    ProtoTask {
        id: task.id.clone(),
        kanban_column_id: task.kanban_column_id.clone(),
        title: task.title.clone(),
        description: task.description.clone(),
        due_date: task.due_date.map(to_proto_time),
        sort_order: task.sort_order,
        assignee_ids: assignee_ids.to_vec(),
    }
}

fn column_to_proto(column: &KanbanColumn, tasks: &[(Task, Vec<String>)]) -> ProtoKanbanColumn {
    ProtoKanbanColumn {
        id: column.id.clone(),
        project_id: column.project_id.clone(),
        name: column.name.clone(),
        sort_order: column.sort_order,
        tasks: tasks
            .iter()
            .map(|(task, assignees)| task_to_proto(task, assignees))
            .collect(),
    }
}

fn board_to_proto(project_id: &str, columns: &[BoardColumn]) -> ProtoBoard {
    ProtoBoard {
        project_id: project_id.to_string(),
        columns: columns
            .iter()
            .map(|board_column| column_to_proto(&board_column.column, &board_column.tasks))
            .collect(),
    }
}

impl BoardController {
    fn try_get_board(&self, caller: &str, project_id: &str) -> Result<ProtoBoard, AppError> {
        let conn = self.pool.get()?;
        require_role(&conn, project_id, caller, Role::Member)?;
        let columns = column::load_board(&conn, project_id)?;
        Ok(board_to_proto(project_id, &columns))
    }

    fn try_create_column(
        &self,
        caller: &str,
        data: &ProjectIdAndColumnName,
    ) -> Result<ProtoKanbanColumn, AppError> {
        if data.column_name.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "column_name: must not be empty".to_string(),
            ));
        }
        let conn = self.pool.get()?;
        require_role(&conn, &data.project_id, caller, Role::Member)?;
        let created = column::create(&conn, &data.project_id, &data.column_name)?;
        Ok(column_to_proto(&created, &[]))
    }

    fn try_rename_column(
        &self,
        caller: &str,
        data: &ColumnIdAndName,
    ) -> Result<ProtoKanbanColumn, AppError> {
        if data.column_name.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "column_name: must not be empty".to_string(),
            ));
        }
        let conn = self.pool.get()?;
        let existing = column::load(&conn, &data.column_id)?;
        require_role(&conn, &existing.project_id, caller, Role::Member)?;
        let renamed = column::rename(&conn, &data.column_id, &data.column_name)?;
        Ok(column_to_proto(&renamed, &[]))
    }

    fn try_delete_column(
        &self,
        caller: &str,
        column_id: &str,
    ) -> Result<ProtoKanbanColumn, AppError> {
        let conn = self.pool.get()?;
        let existing = column::load(&conn, column_id)?;
        require_role(&conn, &existing.project_id, caller, Role::Member)?;
        let dropped = column::remove(&conn, column_id)?;
        Ok(column_to_proto(&dropped, &[]))
    }

    fn try_reorder_columns(
        &self,
        caller: &str,
        data: &ReorderColumnsParams,
    ) -> Result<ProtoBoard, AppError> {
        let conn = self.pool.get()?;
        require_role(&conn, &data.project_id, caller, Role::Member)?;
        column::reorder(&conn, &data.project_id, &data.ordered_column_ids)?;
        let columns = column::load_board(&conn, &data.project_id)?;
        Ok(board_to_proto(&data.project_id, &columns))
    }

    fn try_create_task(
        &self,
        caller: &str,
        data: &CreateTaskParams,
    ) -> Result<ProtoTask, AppError> {
        if data.title.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "title: must not be empty".to_string(),
            ));
        }
        let conn = self.pool.get()?;
        let owning_column = column::load(&conn, &data.column_id)?;
        require_role(&conn, &owning_column.project_id, caller, Role::Member)?;
        let created = task::create(&conn, &data.column_id, &data.title, &data.description)?;
        Ok(task_to_proto(&created, &[]))
    }

    fn try_update_task(
        &self,
        caller: &str,
        data: &UpdateTaskParams,
    ) -> Result<ProtoTask, AppError> {
        if let Some(title) = &data.title {
            if title.trim().is_empty() {
                return Err(AppError::InvalidArgument(
                    "title: must not be empty".to_string(),
                ));
            }
        }
        let conn = self.pool.get()?;
        let existing = task::load(&conn, &data.task_id)?;
        let owning_column = column::load(&conn, &existing.kanban_column_id)?;
        require_role(&conn, &owning_column.project_id, caller, Role::Member)?;

        let change_set = TaskChangeSet {
            title: data.title.clone(),
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
        let updated = task::update_fields(&conn, &data.task_id, change_set, due_date)?;
        let assignees = task::assignee_ids(&conn, &data.task_id)?;
        Ok(task_to_proto(&updated, &assignees))
    }

    fn try_delete_task(&self, caller: &str, task_id: &str) -> Result<ProtoTask, AppError> {
        let conn = self.pool.get()?;
        let existing = task::load(&conn, task_id)?;
        let owning_column = column::load(&conn, &existing.kanban_column_id)?;
        require_role(&conn, &owning_column.project_id, caller, Role::Member)?;
        let dropped = task::remove(&conn, task_id)?;
        Ok(task_to_proto(&dropped, &[]))
    }

    fn try_move_task(&self, caller: &str, data: &MoveTaskParams) -> Result<ProtoBoard, AppError> {
        let conn = self.pool.get()?;
        let existing = task::load(&conn, &data.task_id)?;
        let owning_column = column::load(&conn, &existing.kanban_column_id)?;
        require_role(&conn, &owning_column.project_id, caller, Role::Member)?;
        let project_id = task::move_to(
            &conn,
            &data.task_id,
            &data.to_column_id,
            data.to_index as usize,
        )?;
        let columns = column::load_board(&conn, &project_id)?;
        Ok(board_to_proto(&project_id, &columns))
    }

    fn try_assign(&self, caller: &str, data: &TaskIdAndUserId) -> Result<ProtoTask, AppError> {
        let conn = self.pool.get()?;
        let existing = task::load(&conn, &data.task_id)?;
        let owning_column = column::load(&conn, &existing.kanban_column_id)?;
        require_role(&conn, &owning_column.project_id, caller, Role::Member)?;
        let updated = task::assign_member(&conn, &data.task_id, &data.user_id)?;
        let assignees = task::assignee_ids(&conn, &data.task_id)?;
        Ok(task_to_proto(&updated, &assignees))
    }

    fn try_unassign(&self, caller: &str, data: &TaskIdAndUserId) -> Result<ProtoTask, AppError> {
        let conn = self.pool.get()?;
        let existing = task::load(&conn, &data.task_id)?;
        let owning_column = column::load(&conn, &existing.kanban_column_id)?;
        require_role(&conn, &owning_column.project_id, caller, Role::Member)?;
        let updated = task::unassign_member(&conn, &data.task_id, &data.user_id)?;
        let assignees = task::assignee_ids(&conn, &data.task_id)?;
        Ok(task_to_proto(&updated, &assignees))
    }
}

#[tonic::async_trait]
impl BoardService for BoardController {
    async fn get_board(
        &self,
        request: Request<ProjectId>,
    ) -> Result<Response<ProtoBoard>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_get_board(&caller, &request.get_ref().project_id)
            .map_err(|err| reject("get_board", err))?;
        Ok(Response::new(reply))
    }

    async fn create_column(
        &self,
        request: Request<ProjectIdAndColumnName>,
    ) -> Result<Response<ProtoKanbanColumn>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_create_column(&caller, request.get_ref())
            .map_err(|err| reject("create_column", err))?;
        Ok(Response::new(reply))
    }

    async fn rename_column(
        &self,
        request: Request<ColumnIdAndName>,
    ) -> Result<Response<ProtoKanbanColumn>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_rename_column(&caller, request.get_ref())
            .map_err(|err| reject("rename_column", err))?;
        Ok(Response::new(reply))
    }

    async fn delete_column(
        &self,
        request: Request<ColumnId>,
    ) -> Result<Response<ProtoKanbanColumn>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_delete_column(&caller, &request.get_ref().column_id)
            .map_err(|err| reject("delete_column", err))?;
        Ok(Response::new(reply))
    }

    async fn reorder_columns(
        &self,
        request: Request<ReorderColumnsParams>,
    ) -> Result<Response<ProtoBoard>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_reorder_columns(&caller, request.get_ref())
            .map_err(|err| reject("reorder_columns", err))?;
        Ok(Response::new(reply))
    }

    async fn create_task(
        &self,
        request: Request<CreateTaskParams>,
    ) -> Result<Response<ProtoTask>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_create_task(&caller, request.get_ref())
            .map_err(|err| reject("create_task", err))?;
        Ok(Response::new(reply))
    }

    async fn update_task(
        &self,
        request: Request<UpdateTaskParams>,
    ) -> Result<Response<ProtoTask>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_update_task(&caller, request.get_ref())
            .map_err(|err| reject("update_task", err))?;
        Ok(Response::new(reply))
    }

    async fn delete_task(
        &self,
        request: Request<TaskId>,
    ) -> Result<Response<ProtoTask>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_delete_task(&caller, &request.get_ref().task_id)
            .map_err(|err| reject("delete_task", err))?;
        Ok(Response::new(reply))
    }

    async fn move_task(
        &self,
        request: Request<MoveTaskParams>,
    ) -> Result<Response<ProtoBoard>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_move_task(&caller, request.get_ref())
            .map_err(|err| reject("move_task", err))?;
        Ok(Response::new(reply))
    }

    async fn assign_member(
        &self,
        request: Request<TaskIdAndUserId>,
    ) -> Result<Response<ProtoTask>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_assign(&caller, request.get_ref())
            .map_err(|err| reject("assign_member", err))?;
        Ok(Response::new(reply))
    }

    async fn unassign_member(
        &self,
        request: Request<TaskIdAndUserId>,
    ) -> Result<Response<ProtoTask>, Status> {
        let caller = caller_id(&request)?;
        let reply = self
            .try_unassign(&caller, request.get_ref())
            .map_err(|err| reject("unassign_member", err))?;
        Ok(Response::new(reply))
    }
}

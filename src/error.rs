use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tonic::Status;

/// Domain errors shared by the repos and controllers. Every variant maps to
/// exactly one `tonic::Status` code; database detail never crosses the wire.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("caller identity is missing")]
    Unauthenticated,
    #[error("{0}")]
    PermissionDenied(&'static str),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    FailedPrecondition(String),
    #[error("database error: {0}")]
    Database(#[from] DieselError),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("object storage error: {0}")]
    ObjectStore(#[from] Status),
}

impl From<AppError> for Status {
    fn from(err: AppError) -> Status {
        match err {
            AppError::NotFound(what) => Status::not_found(format!("{} not found", what)),
            AppError::Unauthenticated => Status::unauthenticated("caller identity is missing"),
            AppError::PermissionDenied(msg) => Status::permission_denied(msg),
            AppError::InvalidArgument(msg) => Status::invalid_argument(msg),
            AppError::FailedPrecondition(msg) => Status::failed_precondition(msg),
            AppError::Database(DieselError::NotFound) => Status::not_found("record not found"),
            AppError::Database(DieselError::DatabaseError(
                DatabaseErrorKind::SerializationFailure,
                _,
            )) => Status::aborted("conflicting concurrent update"),
            AppError::Database(_) | AppError::Pool(_) => {
                Status::unavailable("database is unavailable")
            }
            AppError::ObjectStore(_) => Status::unavailable("object storage is unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn not_found_maps_to_not_found() {
        let status = Status::from(AppError::NotFound("project"));
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "project not found");
    }

    #[test]
    fn database_detail_is_not_leaked() {
        let err = AppError::Database(DieselError::DatabaseError(
            DatabaseErrorKind::UnableToSendCommand,
            Box::new(String::from("secret host name")),
        ));
        let status = Status::from(err);
        assert_eq!(status.code(), Code::Unavailable);
        assert!(!status.message().contains("secret"));
    }

    #[test]
    fn serialization_conflict_maps_to_aborted() {
        let err = AppError::Database(DieselError::DatabaseError(
            DatabaseErrorKind::SerializationFailure,
            Box::new(String::from("could not serialize access")),
        ));
        assert_eq!(Status::from(err).code(), Code::Aborted);
    }
}

pub mod board;
pub mod files;
pub mod polls;
pub mod projects;
pub mod threads;

use chrono::{DateTime, TimeZone, Utc};
use tonic::{Request, Status};
use tracing::warn;

use crate::error::AppError;

/// Metadata key under which the gateway forwards the authenticated user id.
pub const USER_ID_METADATA_KEY: &str = "x-user-id";

/// Pulls the caller's identity-provider id out of the request metadata.
pub fn caller_id<T>(request: &Request<T>) -> Result<String, Status> {
    request
        .metadata()
        .get(USER_ID_METADATA_KEY)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| Status::from(AppError::Unauthenticated))
}

/// Logs a failed operation and converts it for the wire.
pub fn reject(operation: &str, err: AppError) -> Status {
    warn!("{} rejected: {}", operation, err);
    Status::from(err)
}

pub fn to_proto_time(time: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: time.timestamp(),
        nanos: time.timestamp_subsec_nanos() as i32,
    }
}

/// Wire timestamps are caller-controlled; anything chrono cannot represent
/// is rejected instead of trusted.
pub fn from_proto_time(time: &prost_types::Timestamp) -> Result<DateTime<Utc>, AppError> {
    if !(0..1_000_000_000).contains(&time.nanos) {
        return Err(AppError::InvalidArgument(format!(
            "timestamp: nanos out of range: {}",
            time.nanos
        )));
    }
    Utc.timestamp_opt(time.seconds, time.nanos as u32)
        .single()
        .ok_or_else(|| {
            AppError::InvalidArgument(format!(
                "timestamp: seconds out of range: {}",
                time.seconds
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn caller_id_reads_the_metadata_key() {
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(USER_ID_METADATA_KEY, "user-1".parse().unwrap());
        assert_eq!(caller_id(&request).unwrap(), "user-1");
    }

    #[test]
    fn missing_or_empty_identity_is_unauthenticated() {
        let request = Request::new(());
        assert_eq!(caller_id(&request).unwrap_err().code(), Code::Unauthenticated);

        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(USER_ID_METADATA_KEY, "".parse().unwrap());
        assert_eq!(caller_id(&request).unwrap_err().code(), Code::Unauthenticated);
    }

    #[test]
    fn timestamps_round_trip() {
        let now = Utc.timestamp(1_658_000_000, 500);
        assert_eq!(from_proto_time(&to_proto_time(now)).unwrap(), now);
    }

    #[test]
    fn unrepresentable_timestamps_are_invalid_argument() {
        let too_far = prost_types::Timestamp {
            seconds: i64::MAX,
            nanos: 0,
        };
        assert!(matches!(
            from_proto_time(&too_far),
            Err(AppError::InvalidArgument(_))
        ));

        let negative_nanos = prost_types::Timestamp {
            seconds: 0,
            nanos: -1,
        };
        assert!(matches!(
            from_proto_time(&negative_nanos),
            Err(AppError::InvalidArgument(_))
        ));

        let overflowing_nanos = prost_types::Timestamp {
            seconds: 0,
            nanos: 2_000_000_000,
        };
        assert!(matches!(
            from_proto_time(&overflowing_nanos),
            Err(AppError::InvalidArgument(_))
        ));
    }
}

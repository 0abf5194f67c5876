use diesel::{
    r2d2::{ConnectionManager, PoolError},
    PgConnection,
};
use dotenv::dotenv;
use r2d2::Pool;
use std::env;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

const DEFAULT_POOL_SIZE: u32 = 10;

pub fn establish_connection() -> Result<PgPool, PoolError> {
    dotenv().ok();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL env variable must be set");
    let max_size = env::var("DATABASE_POOL_SIZE")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_POOL_SIZE);
    let manager = ConnectionManager::<PgConnection>::new(&database_url);
    Pool::builder().max_size(max_size).build(manager)
}

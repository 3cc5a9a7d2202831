//! sqlx implementations of the repository traits.

mod blocks;
mod conversations;
mod messages;
mod reports;
mod users;

use sqlx::PgPool;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

mod read;
mod types;
mod write;

pub(super) use super::PostgresRepositories;

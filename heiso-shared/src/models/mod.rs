/// Database models
///
/// Global tables (`tenant`, `user`, `otp_code`, `password_reset`) take any
/// executor. Everything else is tenant-owned and takes a connection from a
/// tenant transaction opened with [`crate::db::rls::begin`].
///
/// # Example
///
/// ```no_run
/// use heiso_shared::db::rls;
/// use heiso_shared::models::member::Member;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let mut tx = rls::begin(&pool, "t_8Hq2LxP0aZ").await?;
/// let team = Member::list(&mut tx).await?;
/// tx.commit().await?;
/// println!("{} members", team.len());
/// # Ok(())
/// # }
/// ```

pub mod api_key;
pub mod file;
pub mod member;
pub mod menu;
pub mod navigation;
pub mod otp_code;
pub mod password_reset;
pub mod permission;
pub mod post;
pub mod role;
pub mod setting;
pub mod template;
pub mod tenant;
pub mod user;

use crate::tree::TreeError;

/// Failure of a batch parent/order update
#[derive(Debug, thiserror::Error)]
pub enum ReorderError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

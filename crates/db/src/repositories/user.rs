use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

use expenseflow_core::domain::user::{Role, User, UserId};

use super::{RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) async fn load_user(
    conn: &mut SqliteConnection,
    id: &UserId,
) -> Result<Option<User>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, name, email, role, manager_id, company_id FROM users WHERE id = ?",
    )
    .bind(&id.0)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let user_id: String =
        row.try_get("id").map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let name: String =
        row.try_get("name").map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let email: String =
        row.try_get("email").map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let role_raw: String =
        row.try_get("role").map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let manager_id: Option<String> =
        row.try_get("manager_id").map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let company_id: String =
        row.try_get("company_id").map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(Some(User {
        id: UserId(user_id),
        name,
        email,
        role: role_raw.parse::<Role>().map_err(RepositoryError::Decode)?,
        manager_id: manager_id.map(UserId),
        company_id,
    }))
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_user(&mut conn, id).await
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO users (id, name, email, role, manager_id, company_id)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 role = excluded.role,
                 manager_id = excluded.manager_id,
                 company_id = excluded.company_id",
        )
        .bind(&user.id.0)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.manager_id.as_ref().map(|id| id.0.clone()))
        .bind(&user.company_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use expenseflow_core::domain::user::{Role, User, UserId};

    use super::SqlUserRepository;
    use crate::repositories::UserRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn save_and_find_round_trip() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let repo = SqlUserRepository::new(pool);
        let manager = User {
            id: UserId("u-mgr".to_string()),
            name: "Mara".to_string(),
            email: "mara@example.com".to_string(),
            role: Role::Manager,
            manager_id: None,
            company_id: "co-1".to_string(),
        };
        let employee = User {
            id: UserId("u-emp".to_string()),
            name: "Eli".to_string(),
            email: "eli@example.com".to_string(),
            role: Role::Employee,
            manager_id: Some(UserId("u-mgr".to_string())),
            company_id: "co-1".to_string(),
        };

        repo.save(manager).await.expect("save manager");
        repo.save(employee.clone()).await.expect("save employee");

        let found = repo
            .find_by_id(&UserId("u-emp".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found, employee);

        let missing = repo.find_by_id(&UserId("u-ghost".to_string())).await.expect("find");
        assert!(missing.is_none());
    }
}

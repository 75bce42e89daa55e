//! Migrate command - Database migration management.

use sea_orm_migration::MigratorTrait;

use crate::cli::args::{MigrateAction, MigrateArgs};
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::infra::db::{self, migrations::Migrator};

/// Execute the migrate command
pub async fn execute(args: MigrateArgs, config: Config) -> AppResult<()> {
    tracing::info!("Running migration command...");

    let connection = db::connect(&config.database_url).await?;

    match args.action {
        MigrateAction::Up => {
            tracing::info!("Running pending migrations...");
            Migrator::up(&connection, None).await?;
            tracing::info!("Migrations completed successfully");
        }
        MigrateAction::Down => {
            tracing::info!("Rolling back last migration...");
            Migrator::down(&connection, Some(1)).await?;
            tracing::info!("Rollback completed");
        }
        MigrateAction::Status => {
            let applied = Migrator::get_applied_migrations(&connection).await?;
            let pending = Migrator::get_pending_migrations(&connection).await?;
            tracing::info!(
                "{} applied, {} pending migrations",
                applied.len(),
                pending.len()
            );
            for migration in pending {
                tracing::info!("pending: {}", migration.name());
            }
        }
        MigrateAction::Fresh => {
            tracing::warn!("Dropping all tables and re-running migrations...");
            Migrator::fresh(&connection)
                .await
                .map_err(|e| AppError::internal(format!("Fresh migration failed: {}", e)))?;
            tracing::info!("Fresh migration completed");
        }
    }

    Ok(())
}

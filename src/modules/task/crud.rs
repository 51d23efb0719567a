use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool};
use uuid::Uuid;

use super::interface::{ReminderStore, Result};
use super::model::{DueReminder, Reminder, ReminderOffset, Task, TaskStatus};

pub struct MySqlReminderStore {
    pool: Pool<MySql>,
    batch_limit: u32,
}

impl MySqlReminderStore {
    pub fn new(pool: Pool<MySql>, batch_limit: u32) -> Self {
        Self { pool, batch_limit }
    }
}

#[async_trait]
impl ReminderStore for MySqlReminderStore {
    async fn find_due_unsent_reminders(&self, now: DateTime<Utc>) -> Result<Vec<DueReminder>> {
        let due = sqlx::query_as::<_, DueReminder>(
            r#"
            SELECT r.id AS reminder_id,
                   t.id AS task_id,
                   t.title AS task_title,
                   t.description AS task_description,
                   t.scheduled_for AS due_date,
                   a.email AS owner_email
            FROM task_reminders r
            JOIN tasks t ON t.id = r.task_id
            JOIN accounts a ON a.id = t.owner_id
            WHERE r.sent = FALSE
              AND t.status = ?
              AND TIMESTAMPADD(SECOND, r.offset_seconds, t.scheduled_for) <= ?
            ORDER BY TIMESTAMPADD(SECOND, r.offset_seconds, t.scheduled_for), r.id
            LIMIT ?
            "#,
        )
        .bind(TaskStatus::Active.as_i8())
        .bind(now)
        .bind(self.batch_limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(due)
    }

    async fn mark_sent(&self, reminder_id: &str, sent_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE task_reminders SET sent = TRUE, sent_at = ? WHERE id = ? AND sent = FALSE",
        )
        .bind(sent_at)
        .bind(reminder_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn create_task(&self, task: &Task, offsets: &[ReminderOffset]) -> Result<Vec<Reminder>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tasks (id, owner_id, title, description, scheduled_for, status)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.id)
        .bind(&task.owner_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.scheduled_for)
        .bind(task.status.as_i8())
        .execute(&mut *tx)
        .await?;

        let mut reminders = Vec::with_capacity(offsets.len());
        for offset in offsets {
            let reminder = Reminder {
                id: Uuid::new_v4().to_string(),
                task_id: task.id.clone(),
                offset_seconds: offset.seconds(),
                sent: false,
                sent_at: None,
            };

            sqlx::query(
                "INSERT INTO task_reminders (id, task_id, offset_seconds, sent) VALUES (?, ?, ?, FALSE)",
            )
            .bind(&reminder.id)
            .bind(&reminder.task_id)
            .bind(reminder.offset_seconds)
            .execute(&mut *tx)
            .await?;

            reminders.push(reminder);
        }

        tx.commit().await?;
        Ok(reminders)
    }

    async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE tasks SET status = ? WHERE id = ?")
            .bind(status.as_i8())
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

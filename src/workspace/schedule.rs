//! 定时刷新：按固定的墙钟时间（cron 表达式，默认每天零点）重新克隆默认仓库
//!
//! 调度基于"下一个触发时刻"而不是"距上次运行的间隔"，
//! 运行失败只记录日志，不影响后续调度。

use chrono::{DateTime, Local, TimeZone};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::workspace::sync::RepositorySync;

/// 每天本地时间零点
pub const DEFAULT_REFRESH_SCHEDULE: &str = "0 0 * * *";

/// 单次最长休眠，之后重新计算（应对系统时间调整）
const MAX_SLEEP: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid refresh schedule '{expr}': {reason}")]
    InvalidExpression { expr: String, reason: String },
}

pub struct ScheduleCoordinator {
    sync: Arc<RepositorySync>,
    repo_url: String,
    schedule: Schedule,
}

impl ScheduleCoordinator {
    pub fn new(
        sync: Arc<RepositorySync>,
        repo_url: impl Into<String>,
        expr: &str,
    ) -> Result<Self, ScheduleError> {
        Ok(Self {
            sync,
            repo_url: repo_url.into(),
            schedule: parse_schedule(expr)?,
        })
    }

    /// First trigger strictly after `now`
    pub fn next_run_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(now).next()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let mut next = self.next_run_after(&Local::now());
        info!(
            url = %self.repo_url,
            next_run = ?next.map(|t| t.to_rfc3339()),
            "Scheduled refresh enabled"
        );

        loop {
            let Some(due) = next else {
                warn!("Refresh schedule has no upcoming runs, stopping");
                return;
            };

            let now = Local::now();
            if now >= due {
                self.fire().await;
                next = self.next_run_after(&Local::now());
                continue;
            }

            let wait = (due - now).to_std().unwrap_or_default().min(MAX_SLEEP);
            tokio::time::sleep(wait).await;
        }
    }

    async fn fire(&self) {
        info!(url = %self.repo_url, "Running scheduled refresh");
        // 失败已由 RepositorySync 写入历史，这里只吞掉错误继续调度
        if let Err(e) = self.sync.clone_repo(&self.repo_url).await {
            warn!(url = %self.repo_url, error = %e, "Scheduled refresh failed");
        }
    }
}

/// Parse a 5-field (minute precision) or 6/7-field (seconds) cron expression
pub fn parse_schedule(expr: &str) -> Result<Schedule, ScheduleError> {
    Schedule::from_str(&normalize_cron_expr(expr)).map_err(|e| ScheduleError::InvalidExpression {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

fn normalize_cron_expr(expr: &str) -> String {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::hub::BroadcastHub;
    use crate::workspace::history::LogRingBuffer;
    use crate::workspace::root::WorkspaceRoot;
    use chrono::Utc;
    use tempfile::TempDir;

    fn coordinator(expr: &str) -> (ScheduleCoordinator, TempDir) {
        let temp = TempDir::new().unwrap();
        let root = WorkspaceRoot::open(temp.path()).unwrap();
        let sync = Arc::new(RepositorySync::new(
            root,
            Arc::new(LogRingBuffer::new()),
            BroadcastHub::new(4),
        ));
        (
            ScheduleCoordinator::new(sync, "https://example.com/repo.git", expr).unwrap(),
            temp,
        )
    }

    #[test]
    fn test_daily_boundary() {
        let (coord, _temp) = coordinator(DEFAULT_REFRESH_SCHEDULE);
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 12, 30, 0).unwrap();
        let next = coord.next_run_after(&now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_fixed_time_not_interval() {
        let (coord, _temp) = coordinator("30 3 * * *");
        // 刚过触发时刻：下一次是次日同一时间，而不是 24 小时后
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 3, 30, 1).unwrap();
        let next = coord.next_run_after(&now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 15, 3, 30, 0).unwrap());

        let before = Utc.with_ymd_and_hms(2026, 3, 14, 1, 0, 0).unwrap();
        assert_eq!(
            coord.next_run_after(&before).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 14, 3, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_six_field_expression_passes_through() {
        assert_eq!(normalize_cron_expr("0 0 0 * * *"), "0 0 0 * * *");
        assert_eq!(normalize_cron_expr(" 0 0 * * * "), "0 0 0 * * *");
        assert!(parse_schedule("0 15 6 * * *").is_ok());
    }

    #[test]
    fn test_invalid_expression() {
        assert!(matches!(
            parse_schedule("every day please"),
            Err(ScheduleError::InvalidExpression { .. })
        ));
    }
}

mod progress;

use std::fmt;
pub use progress::ProgressManager;

pub fn print_success(message: &str) {
    println!("✓ {}", message);
}

pub fn print_error(message: &str) {
    println!("✗ {}", message);
}

/// 批次结束后的传输摘要
pub struct TransferSummary {
    pub total_tasks: usize,
    pub total_size: u64,
    pub elapsed_time: std::time::Duration,
    pub success_count: usize,
    pub failed_count: usize,
    pub cancelled_count: usize,
}

impl fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n传输摘要:")?;
        writeln!(f, "总任务数: {}", self.total_tasks)?;
        writeln!(f, "总大小: {}", format_size(self.total_size))?;
        writeln!(f, "耗时: {:.2}秒", self.elapsed_time.as_secs_f64())?;
        writeln!(f, "成功: {}", self.success_count)?;
        writeln!(f, "失败: {}", self.failed_count)?;
        if self.cancelled_count > 0 {
            writeln!(f, "取消: {}", self.cancelled_count)?;
        }
        Ok(())
    }
}

pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

pub fn format_speed(speed: u64) -> String {
    if speed > 1024 * 1024 {
        format!("{:.2} MB/s", speed as f64 / (1024.0 * 1024.0))
    } else if speed > 1024 {
        format!("{:.2} KB/s", speed as f64 / 1024.0)
    } else {
        format!("{} B/s", speed)
    }
}

pub fn format_eta(seconds: u64) -> String {
    if seconds > 3600 {
        format!("{}h{}m", seconds / 3600, (seconds % 3600) / 60)
    } else if seconds > 60 {
        format!("{}m{}s", seconds / 60, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.00 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1024 * 1024), "1.00 MB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024), "5.00 GB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(100), "100 B/s");
        assert_eq!(format_speed(2048), "2.00 KB/s");
        assert_eq!(format_speed(3 * 1024 * 1024), "3.00 MB/s");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(30), "30s");
        assert_eq!(format_eta(90), "1m30s");
        assert_eq!(format_eta(3700), "1h1m");
    }

    #[test]
    fn test_summary_display() {
        let summary = TransferSummary {
            total_tasks: 3,
            total_size: 2048,
            elapsed_time: std::time::Duration::from_secs(5),
            success_count: 2,
            failed_count: 1,
            cancelled_count: 0,
        };
        let text = summary.to_string();
        assert!(text.contains("传输摘要"));
        assert!(text.contains("成功: 2"));
        assert!(text.contains("失败: 1"));
        assert!(!text.contains("取消"));
    }
}

use indicatif::{ProgressBar, ProgressStyle};

use super::{format_eta, format_speed};

/// 汇总进度条：显示整个批次的总体进度
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total.max(1));
        bar.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }

    pub fn update_progress(&self, transferred: u64, speed: u64) {
        self.bar.set_position(transferred);
        let eta = if speed > 0 && self.bar.length().unwrap_or(0) > transferred {
            let remaining = self.bar.length().unwrap_or(0) - transferred;
            format_eta(remaining / speed)
        } else {
            "未知".to_string()
        };
        self.bar.set_message(format!("{} | ETA:{}", format_speed(speed), eta));
    }

    /// 总大小在探测后才知道，按需调整
    pub fn set_total(&self, total: u64) {
        if total > 0 {
            self.bar.set_length(total);
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

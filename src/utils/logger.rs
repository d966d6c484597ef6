use chrono::Local;
use log::LevelFilter;
use std::io::{BufWriter, Write};
use std::fs::{File, OpenOptions};
use std::path::Path;
use actix::prelude::*;

/// 日志消息
pub struct LogMsg {
    pub level: LevelFilter,
    pub message: String,
}
impl Message for LogMsg { type Result = (); }

/// 日志Actor：带大小轮转的文件日志
pub struct LoggerActor {
    writer: BufWriter<File>,
    level: LevelFilter,
    file_path: String,
    max_size: u64, // 最大文件大小 (bytes)
    current_size: u64,
}

impl LoggerActor {
    pub fn new(file_path: &str, level: LevelFilter, max_size: u64) -> Result<Self, std::io::Error> {
        // 确保日志目录存在
        if let Some(parent) = Path::new(file_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            writer: BufWriter::new(file),
            level,
            file_path: file_path.to_string(),
            max_size,
            current_size,
        })
    }

    /// 检查并执行日志轮转，旧文件保留一份 .backup
    fn check_rotation(&mut self) -> Result<(), std::io::Error> {
        if self.current_size > self.max_size {
            self.writer.flush()?;

            let backup_path = format!("{}.backup", self.file_path);
            if Path::new(&backup_path).exists() {
                std::fs::remove_file(&backup_path)?;
            }
            std::fs::rename(&self.file_path, &backup_path)?;

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.file_path)?;
            self.writer = BufWriter::new(file);
            self.current_size = 0;
        }
        Ok(())
    }

    fn write_log(&mut self, level: LevelFilter, message: &str) -> Result<(), std::io::Error> {
        if level <= self.level {
            let log_entry = format!(
                "{} [{}] - {}\n",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                level,
                message
            );

            self.check_rotation()?;

            self.writer.write_all(log_entry.as_bytes())?;
            self.current_size += log_entry.len() as u64;

            // 定期刷新缓冲区
            if self.current_size % 1024 < log_entry.len() as u64 {
                self.writer.flush()?;
            }
        }
        Ok(())
    }
}

impl Actor for LoggerActor {
    type Context = Context<Self>;
}

impl Handler<LogMsg> for LoggerActor {
    type Result = ();
    fn handle(&mut self, msg: LogMsg, _ctx: &mut Self::Context) {
        if let Err(e) = self.write_log(msg.level, &msg.message) {
            eprintln!("日志写入失败: {}", e);
        }
    }
}

/// 把 `log` 宏的输出转发给日志Actor
struct ForwardLogger {
    addr: Addr<LoggerActor>,
    level: LevelFilter,
}

impl log::Log for ForwardLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            self.addr.do_send(LogMsg {
                level: record.level().to_level_filter(),
                message: format!("{}: {}", record.target(), record.args()),
            });
        }
    }

    fn flush(&self) {}
}

/// 安装全局 logger，之后引擎各处的 `log::info!` 等宏都写入日志文件
///
/// 只能调用一次，重复调用返回错误。
pub fn init_global(addr: Addr<LoggerActor>, level: LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_boxed_logger(Box::new(ForwardLogger { addr, level }))?;
    log::set_max_level(level);
    Ok(())
}

// 便捷的日志方法 - 为Addr<LoggerActor>提供扩展方法
pub trait LoggerExt {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn debug(&self, message: &str);
}

impl LoggerExt for Addr<LoggerActor> {
    fn info(&self, message: &str) {
        self.do_send(LogMsg {
            level: LevelFilter::Info,
            message: message.to_string(),
        });
    }

    fn error(&self, message: &str) {
        self.do_send(LogMsg {
            level: LevelFilter::Error,
            message: message.to_string(),
        });
    }

    fn warn(&self, message: &str) {
        self.do_send(LogMsg {
            level: LevelFilter::Warn,
            message: message.to_string(),
        });
    }

    fn debug(&self, message: &str) {
        self.do_send(LogMsg {
            level: LevelFilter::Debug,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn test_logger_writes_to_file() {
        let path = "./test_logger_output.log";
        let _ = std::fs::remove_file(path);
        let addr = LoggerActor::new(path, LevelFilter::Info, 1024 * 1024)
            .expect("创建日志Actor失败")
            .start();

        addr.info("第一条日志");
        addr.debug("低于级别，不写入");
        // 等消息被处理
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(addr);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let content = std::fs::read_to_string(path).unwrap_or_default();
        assert!(content.contains("第一条日志"));
        assert!(!content.contains("不写入"));
        let _ = std::fs::remove_file(path);
    }
}

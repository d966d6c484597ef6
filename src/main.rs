use actix::prelude::*;
use crossterm::{
    cursor, execute, terminal,
    event::{self, Event, KeyCode},
};
use log::LevelFilter;
use std::path::Path;
use uuid::Uuid;

use multitrans::cli;
use multitrans::core::manager::*;
use multitrans::ui::{self, ProgressManager, TransferSummary};
use multitrans::utils::logger::{self, LoggerActor, LoggerExt};

const PROGRESS_UPDATE_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);
const KEYBOARD_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);

#[actix::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logger_addr = LoggerActor::new("logs/app.log", LevelFilter::Info, 10 * 1024 * 1024)?.start();
    if let Err(e) = logger::init_global(logger_addr.clone(), LevelFilter::Info) {
        eprintln!("日志初始化失败: {}", e);
    }
    logger_addr.info("程序启动");

    // 解析参数和配置
    let (args, config) = match cli::Args::parse_args() {
        Ok((args, config)) => (args, config),
        Err(e) => {
            eprintln!("参数解析失败: {}", e);
            std::process::exit(1);
        }
    };

    // 获取下载URL列表
    let urls = match args.get_urls() {
        Ok(urls) => urls,
        Err(e) => {
            eprintln!("获取URL列表失败: {}", e);
            std::process::exit(1);
        }
    };

    logger_addr.info(&format!("解析到的URLs: {:?}", urls));
    logger_addr.info(&format!("配置文件路径: {}", args.config));
    logger_addr.info(&format!("配置摘要:\n{}", config.get_summary()));

    println!("配置加载成功");
    println!("{}", config.get_summary());

    // 创建任务执行器
    let manager = TransferManagerActor::new(config).start();

    // 创建并启动所有传输任务
    let task_ids = create_and_start_tasks(&manager, &args, &urls).await?;
    if task_ids.is_empty() {
        eprintln!("没有可传输的任务");
        return Ok(());
    }

    println!("\n开始传输... (按 'c' 取消, 'q' 退出)");
    logger_addr.info(&format!("开始传输 {} 个任务", task_ids.len()));

    // 主循环：处理键盘输入和更新进度
    let start = std::time::Instant::now();
    run_transfer_loop(&manager).await?;

    // 显示最终统计，列出永久失败的任务
    let stats = manager.send(GetStats).await?;
    let summary = TransferSummary {
        total_tasks: stats.total,
        total_size: stats.total_bytes,
        elapsed_time: start.elapsed(),
        success_count: stats.completed,
        failed_count: stats.failed,
        cancelled_count: stats.cancelled,
    };
    println!("{}", summary);

    let failed = manager.send(TakeFailed).await?;
    for f in &failed {
        ui::print_error(&format!("{}: {}", f.label, f.message));
    }
    logger_addr.info(&format!(
        "传输结束 - 成功: {}, 失败: {}",
        stats.completed, stats.failed
    ));

    Ok(())
}

/// 创建并启动所有传输任务
async fn create_and_start_tasks(
    manager: &Addr<TransferManagerActor>,
    args: &cli::Args,
    urls: &[String],
) -> Result<Vec<Uuid>, Box<dyn std::error::Error>> {
    let mut task_ids = Vec::new();

    for url in urls {
        let file_name = extract_filename_from_url(url, &args.file_name);
        let file_path = Path::new(&args.download_dir).join(&file_name);

        match manager
            .send(AddDownload {
                url: url.clone(),
                file: file_path.to_string_lossy().to_string(),
            })
            .await
        {
            Ok(Ok(task_id)) => {
                task_ids.push(task_id);
                ui::print_success(&format!("创建传输任务: {}", file_name));
            }
            Ok(Err(e)) => {
                ui::print_error(&format!("创建传输任务失败: {} - {}", url, e));
            }
            Err(e) => {
                ui::print_error(&format!("发送创建任务消息失败: {} - {}", url, e));
            }
        }
    }

    for task_id in &task_ids {
        manager.do_send(StartTaskById { task_id: *task_id });
    }

    Ok(task_ids)
}

/// 从URL中提取文件名
fn extract_filename_from_url(url: &str, custom_name: &Option<String>) -> String {
    if let Some(name) = custom_name {
        return name.clone();
    }

    if let Some(last_slash) = url.rfind('/') {
        let filename = &url[last_slash + 1..];
        if !filename.is_empty() && !filename.contains('?') {
            return filename.to_string();
        }
    }

    // 无法从URL提取时使用时间戳名称
    format!("transfer_{}", chrono::Utc::now().timestamp())
}

/// 传输主循环
async fn run_transfer_loop(
    manager: &Addr<TransferManagerActor>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut last_update = std::time::Instant::now();

    terminal::enable_raw_mode()?;
    execute!(std::io::stdout(), cursor::Hide)?;

    let stats = manager.send(GetStats).await?;
    let progress = ProgressManager::new(stats.total_bytes);

    loop {
        // 处理键盘输入
        if let Ok(true) = event::poll(KEYBOARD_POLL_INTERVAL) {
            if let Ok(Event::Key(key_event)) = event::read() {
                match key_event.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') => {
                        println!("\n用户退出");
                        log::info!("用户主动退出");
                        break;
                    }
                    KeyCode::Char('c') | KeyCode::Char('C') => {
                        manager.do_send(CancelAll);
                        println!("\n已取消所有传输任务");
                        log::info!("用户取消所有传输任务");
                    }
                    _ => {}
                }
            }
        }

        // 更新进度
        if last_update.elapsed() >= PROGRESS_UPDATE_INTERVAL {
            let stats = manager.send(GetStats).await?;
            progress.set_total(stats.total_bytes);
            progress.update_progress(stats.transferred_bytes, stats.speed);

            // 所有任务都到达终态后退出（包括重试中的任务）
            if stats.total > 0
                && stats.completed + stats.failed + stats.cancelled == stats.total
            {
                break;
            }

            last_update = std::time::Instant::now();
        }

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    execute!(std::io::stdout(), cursor::Show)?;
    terminal::disable_raw_mode()?;
    progress.finish();

    Ok(())
}

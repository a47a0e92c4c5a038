use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use vaultsync_lib::config::DEFAULT_CONFIG_PATH;
use vaultsync_lib::core::shutdown;
use vaultsync_lib::logging::init_logging;
use vaultsync_lib::{AppConfig, Orchestrator};

/// 监控目录、保存历史版本并备份到远程存储
#[derive(Parser, Debug)]
#[command(name = "vaultsync", version, about)]
struct Args {
    /// 配置文件路径
    #[arg(short, long, env = "VAULTSYNC_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// 日志级别，覆盖配置文件 (trace, debug, info, warn, error)
    #[arg(long, env = "VAULTSYNC_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    // guard 需要存活到进程结束，保证日志落盘
    let _guard = init_logging(&config.log, args.log_level.as_deref());

    tracing::info!("配置已加载: {:?}", args.config);

    // 启动前就监听 Ctrl-C，镜像拉取和全量扫描期间也能优雅停止
    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("收到 Ctrl-C，正在停止");
                trigger.trigger();
            }
            Err(e) => tracing::error!("无法监听 Ctrl-C: {}", e),
        }
    });

    let orchestrator = match Orchestrator::from_config(&config).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            tracing::error!("启动失败: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match orchestrator.run(shutdown).await {
        Ok(summary) => {
            tracing::info!(
                "运行结束: 镜像下载 {} 个文件, 首轮备份 {} 个文件, 处理 {} 个事件",
                summary.mirror.files_downloaded,
                summary.initial_scan.changed,
                summary.events_dispatched
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("运行失败: {}", e);
            ExitCode::FAILURE
        }
    }
}

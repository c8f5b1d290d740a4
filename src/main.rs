use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scenario_runner::models::event::{self, EventReceiver};
use scenario_runner::orchestrator::{self, App, RunRequest};
use scenario_runner::utils::logging;
use scenario_runner::Config;

#[derive(Parser, Debug)]
#[command(name = "scenario-runner", version, about = "按 JSON DSL 执行浏览器场景")]
struct Cli {
    /// TOML 配置文件
    #[arg(short, long, global = true, env = "RUNNER_CONFIG")]
    config: Option<PathBuf>,

    /// 显示详细日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 执行一个场景
    Run {
        scenario_id: String,

        /// 在第一步之前打开该地址
        #[arg(long)]
        base_url: Option<String>,

        /// 显示浏览器窗口
        #[arg(long)]
        headed: bool,

        /// 步骤默认超时（毫秒）
        #[arg(long)]
        timeout: Option<u64>,

        /// 覆盖配置中的项目 id
        #[arg(long)]
        project: Option<String>,

        /// 连接该调试端口上的浏览器
        #[arg(long)]
        port: Option<u16>,

        /// 把进度事件逐行以 JSON 写到标准输出
        #[arg(long)]
        events_jsonl: bool,
    },
    /// 只加载并检查场景及其引用的子场景
    Validate { scenario_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.verbose {
        config.verbose_logging = true;
    }
    logging::init(config.verbose_logging);

    match cli.command {
        Command::Validate { scenario_id } => {
            let request = RunRequest {
                scenario_id,
                base_url: None,
            };
            let prepared = orchestrator::prepare(&config, &request).await?;
            info!(
                "✓ 场景 {} 校验通过 ({} 步, 项目 {})",
                prepared.scenario.display_name(),
                prepared.scenario.steps.len(),
                prepared.project_id
            );
            Ok(())
        }
        Command::Run {
            scenario_id,
            base_url,
            headed,
            timeout,
            project,
            port,
            events_jsonl,
        } => {
            if headed {
                config.headless = false;
            }
            if let Some(ms) = timeout {
                config.default_timeout_ms = ms;
            }
            if let Some(project) = project {
                config.project_id = project;
            }
            if port.is_some() {
                config.browser_debug_port = port;
            }

            let cancel = CancellationToken::new();
            let interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("⏹️ 收到中断信号，正在取消运行...");
                    interrupt.cancel();
                }
            });

            let (events, printer) = if events_jsonl {
                let (tx, rx) = event::channel();
                (Some(tx), Some(tokio::spawn(print_events(rx))))
            } else {
                (None, None)
            };

            let request = RunRequest {
                scenario_id,
                base_url,
            };
            let result = App::run_once(config, request, events, cancel).await;
            if let Some(printer) = printer {
                let _ = printer.await;
            }

            let result = result?;
            logging::print_final_stats(&result);
            if !result.is_completed() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// 逐行输出进度事件，发送端全部释放后结束
async fn print_events(mut rx: EventReceiver) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("⚠️ 事件序列化失败: {}", e),
        }
    }
}

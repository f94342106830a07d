/// 过站事件与状态引擎 (Turnaround event & state engine)
///
/// 线程结构:
/// 1. 读取线程: 回放文件或演示剧本 → 帧检测 (bounded channel)
/// 2. 主线程:   逐帧驱动引擎, 打印告警, 结束时输出汇总/导出JSON
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnaround_rs::demo::{DemoFrame, DemoOperator, DemoScript};
use turnaround_rs::replay::ReplayReader;
use turnaround_rs::{Dispatcher, EngineConfig, Role};

/// 过站引擎参数
#[derive(Parser, Debug)]
#[command(author, version, about = "过站事件与状态引擎 - 检测流 → 任务/流程/告警", long_about = None)]
struct Args {
    /// 检测回放文件 (JSON Lines)
    #[arg(short, long, conflicts_with = "demo")]
    detections: Option<PathBuf>,

    /// 运行内置演示剧本
    #[arg(long)]
    demo: bool,

    /// 处理帧数上限 (演示默认300)
    #[arg(short, long)]
    frames: Option<u64>,

    /// 帧率 (覆盖配置文件)
    #[arg(long)]
    fps: Option<f64>,

    /// 配置文件路径 (默认 <config_dir>/turnaround/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 角色标注, 例如 --role 3=FUEL_TRUCK (可重复)
    #[arg(short, long = "role", value_name = "TRACK_ID=ROLE")]
    roles: Vec<String>,

    /// 导出运行快照 (JSON)
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// 日志级别 (RUST_LOG 优先)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 演示随机种子
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn parse_role_arg(text: &str) -> Result<(u32, Role)> {
    let (id, role) = text
        .split_once('=')
        .ok_or_else(|| anyhow!("角色格式应为 TRACK_ID=ROLE: {}", text))?;
    let track_id: u32 = id.trim().parse().with_context(|| format!("无效的跟踪ID: {}", id))?;
    Ok((track_id, role.parse()?))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    if !args.demo && args.detections.is_none() {
        bail!("需要 --detections <FILE> 或 --demo");
    }

    // ========== 配置 ==========
    let config_path = args.config.clone().unwrap_or_else(EngineConfig::default_path);
    let mut config = EngineConfig::load(&config_path);
    if let Some(fps) = args.fps {
        config.fps = fps;
    }
    config.log_summary();
    let fps = config.fps;

    let mut dispatcher = Dispatcher::new(config);
    for text in &args.roles {
        let (track_id, role) = parse_role_arg(text)?;
        dispatcher.assign_role(track_id, role);
    }

    println!("🚀 过站引擎启动 | run_id {}", dispatcher.run_id());
    println!("📐 ROI: {} 个 | 帧率 {}", dispatcher.rois().len(), fps);
    println!();

    // ========== 读取线程 ==========
    let (tx, rx) = bounded::<DemoFrame>(60);
    let demo = args.demo;
    let limit = args.frames;
    let source = args.detections.clone();
    let seed = args.seed;
    let reader = std::thread::spawn(move || -> Result<u64> {
        let mut sent = 0;
        if demo {
            for frame in DemoScript::new(seed, fps).frames(limit.unwrap_or(300)) {
                if tx.send(frame).is_err() {
                    break;
                }
                sent += 1;
            }
        } else if let Some(path) = source {
            for frame in ReplayReader::open(&path)?.take(limit.unwrap_or(u64::MAX) as usize) {
                let frame = DemoFrame {
                    frame: frame?,
                    role_hints: Vec::new(),
                };
                if tx.send(frame).is_err() {
                    break;
                }
                sent += 1;
            }
        }
        Ok(sent)
    });

    // ========== 主循环 ==========
    let mut operator = DemoOperator::new();
    for input in rx.iter() {
        let detections = &input.frame.detections;
        let report = match input.frame.t_sec {
            Some(t) => dispatcher.tick(detections, t),
            None => dispatcher.tick_frame(input.frame.frame, detections),
        };
        if demo {
            operator.observe(&mut dispatcher, &report, &input.role_hints);
        }

        for h in &report.handoffs {
            println!(
                "🔁 t={:>6.1}s 角色交接 {} : {} → {} (IoU {:.2})",
                report.now_t, h.role, h.from_track, h.to_track, h.iou
            );
        }
        for id in &report.opened_alerts {
            if let Some(alert) = dispatcher.alerts().get(id) {
                println!("🚨 t={:>6.1}s [{}] {}", report.now_t, alert.severity, alert.message);
            }
        }
    }

    let sent = reader
        .join()
        .map_err(|_| anyhow!("读取线程异常退出"))??;
    info!(frames = sent, ticks = dispatcher.ticks(), "✅ 处理完成");

    print_summary(&dispatcher);

    // ========== 导出 ==========
    if let Some(path) = &args.export {
        let json = serde_json::to_string_pretty(&dispatcher.snapshot()).context("快照序列化失败")?;
        fs::write(path, json).with_context(|| format!("写入导出文件失败: {}", path.display()))?;
        println!("💾 已导出: {}", path.display());
    } else if dispatcher.ticks() == 0 {
        warn!("没有处理任何帧");
    }

    Ok(())
}

fn print_summary(dispatcher: &Dispatcher) {
    println!();
    println!("========== 任务 (t={:.1}s) ==========", dispatcher.now());
    for (key, rec) in dispatcher.task_store().iter() {
        let since = rec.since.map_or("-".to_string(), |t| format!("{:.1}", t));
        println!("  {:<24} {:<14} since {}", key, rec.status, since);
    }

    println!("========== 流程 ==========");
    for view in dispatcher.step_views() {
        println!("  {:<8} {:<28} {}", view.label, view.title, view.hint);
    }
    match dispatcher.sequence().next_step() {
        Some(step) => println!("  ➡️  下一步: {}", step.title),
        None => println!("  🏁 全部完成"),
    }

    println!("========== 告警 ==========");
    let table = dispatcher.alert_table();
    if table.is_empty() {
        println!("  (无)");
    }
    for row in table {
        println!(
            "  {:>6.1} {:>6.1} {:<8} {:<24} {}",
            row.t_first, row.t_last, row.severity, row.rule, row.message
        );
    }

    println!("========== 角色 ==========");
    for (track_id, role) in dispatcher.roles().iter() {
        println!("  #{:<5} {}", track_id, role.label());
    }

    println!("========== 最近事件 ==========");
    for item in dispatcher.event_log().recent(15) {
        println!("  {:>6.1} {:<5} {}", item.t_sec, item.level, item.msg);
    }
}

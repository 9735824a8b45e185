// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 头盔检测 (Helmet Detection)
///
/// 子命令:
/// 1. image:  单张图片或图片目录
/// 2. video:  视频文件, 可输出标注视频
/// 3. webcam: 摄像头实时推理, Ctrl-C 停止
/// 4. devices: 列出摄像头
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use helmet_rs::cli::{self, Cli, Commands, ModelArgs};
use helmet_rs::input::get_camera_devices;
use helmet_rs::report::{self, ImageEntry, ImageReport, RunInfo, VideoReport};
use helmet_rs::visualizer::{check_font, FONT_NAME};
use helmet_rs::{DetectError, Detector};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Cli::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Cli) -> Result<()> {
    let model_args = match &args.command {
        Commands::Devices => return list_devices(),
        Commands::Image { model, .. }
        | Commands::Video { model, .. }
        | Commands::Webcam { model, .. } => model.clone(),
    };

    // 输入不存在时不加载模型
    match &args.command {
        Commands::Image { source, .. } if !source.exists() => {
            return Err(DetectError::InvalidSource(source.clone()).into());
        }
        Commands::Video { source, .. } if !source.is_file() => {
            return Err(DetectError::InvalidSource(source.clone()).into());
        }
        _ => {}
    }

    // 标签字体 (首次运行时下载)
    if let Err(e) = check_font(FONT_NAME) {
        log::warn!("⚠️ 字体准备失败: {}, 标签将不绘制", e);
    }

    let mut detector = build_detector(&args.config, &model_args)?;

    match args.command {
        Commands::Image {
            source,
            output,
            show,
            json,
            keep_going,
            ..
        } => run_image(&mut detector, &source, output, show, json, keep_going),
        Commands::Video {
            source,
            output,
            show,
            json,
            ..
        } => run_video(&mut detector, &source, output, show, json),
        Commands::Webcam {
            camera, no_show, ..
        } => {
            detector.predict_webcam(camera, !no_show)?;
            Ok(())
        }
        Commands::Devices => Ok(()),
    }
}

fn build_detector(config: &Path, args: &ModelArgs) -> Result<Detector> {
    let mut detector = Detector::new(args.model.as_deref(), config)?;
    if let Some(conf) = args.conf {
        detector.set_conf_threshold(conf)?;
    }
    if let Some(iou) = args.iou {
        detector.set_iou_threshold(iou)?;
    }
    Ok(detector)
}

fn run_info(detector: &Detector) -> RunInfo {
    RunInfo::new(
        detector.model_path(),
        detector.conf_threshold(),
        detector.iou_threshold(),
    )
}

fn run_image(
    detector: &mut Detector,
    source: &Path,
    output: Option<PathBuf>,
    show: bool,
    json: Option<PathBuf>,
    keep_going: bool,
) -> Result<()> {
    let mut entries = Vec::new();

    if source.is_file() {
        let output = output.unwrap_or_else(|| cli::default_image_output(source));
        let result = detector.predict_image(source, Some(&output), show)?;
        println!("✅ 检测到 {} 个目标", result.count());
        for (bbox, label, conf) in result.detections() {
            println!(
                "   {} {:.2} [{:.0}, {:.0}, {:.0}, {:.0}]",
                label, conf, bbox[0], bbox[1], bbox[2], bbox[3]
            );
        }
        println!("💾 结果已保存到 {}", output.display());
        entries.push(ImageEntry::ok(source, Some(&output), &result));
    } else {
        let images = cli::collect_images(source)?;
        if images.is_empty() {
            println!("⚠️ {} 中没有图片", source.display());
            return Ok(());
        }
        if show {
            log::warn!("⚠️ 目录输入不支持 --show, 已忽略");
        }

        let save_dir = output.unwrap_or_else(|| PathBuf::from(cli::IMAGE_OUTPUT_DIR));
        println!("🔍 处理 {} 张图片...", images.len());

        let results = if keep_going {
            detector.predict_batch_isolated(&images, Some(&save_dir))
        } else {
            detector
                .predict_batch(&images, Some(&save_dir))?
                .into_iter()
                .map(Ok)
                .collect()
        };

        let mut total = 0;
        let mut failed = 0;
        for (path, result) in images.iter().zip(&results) {
            let name = path.file_name().map(|n| save_dir.join(n));
            match result {
                Ok(result) => {
                    total += result.count();
                    println!("   {}: {} 个目标", path.display(), result.count());
                    entries.push(ImageEntry::ok(path, name.as_deref(), result));
                }
                Err(e) => {
                    failed += 1;
                    println!("   {}: ❌ {}", path.display(), e);
                    entries.push(ImageEntry::failed(path, e));
                }
            }
        }
        let ok = images.len() - failed;
        println!(
            "✅ 完成 {} 张图片, 共 {} 个目标{}",
            ok,
            total,
            if failed > 0 {
                format!(", {} 张失败", failed)
            } else {
                String::new()
            }
        );
        println!("   平均每张: {:.2}", cli::average_per_image(total, ok));
        println!("💾 结果已保存到 {}", save_dir.display());
    }

    if let Some(json) = json {
        report::write_json(&json, &ImageReport::new(run_info(detector), entries))?;
    }
    Ok(())
}

fn run_video(
    detector: &mut Detector,
    source: &Path,
    output: Option<PathBuf>,
    show: bool,
    json: Option<PathBuf>,
) -> Result<()> {
    let output = output.unwrap_or_else(|| cli::default_video_output(source));
    let stats = detector.predict_video(source, Some(&output), show)?;

    println!("✅ 视频处理完成");
    println!("   总帧数: {}", stats.frames);
    println!("   总检测数: {}", stats.total_detections);
    println!("   平均每帧: {:.2}", stats.avg_detections_per_frame);
    println!("💾 结果已保存到 {}", output.display());

    if let Some(json) = json {
        let report = VideoReport {
            run: run_info(detector),
            source: source.to_path_buf(),
            output: Some(output),
            stats,
        };
        report::write_json(&json, &report)?;
    }
    Ok(())
}

fn list_devices() -> Result<()> {
    let devices = get_camera_devices();
    if devices.is_empty() {
        println!("⚠️ 未找到摄像头");
    } else {
        println!("📷 找到 {} 个摄像头:", devices.len());
        for (index, name) in devices {
            println!("   [{}] {}", index, name);
        }
    }
    Ok(())
}

//! pdf-highlighter 命令行：在 PDF 中高亮模型选出的短语

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use highlight_core::{AnnotationKind, Palette};

use highlighter::ocr::build_ocr;
use highlighter::{select_backend, AppConfig, BackendKind, ChatCompletionsOracle, DocumentOutcome, DocumentPipeline};

#[derive(Parser, Debug)]
#[command(name = "pdf-highlighter")]
#[command(author = "Linch Tech")]
#[command(version)]
#[command(about = "Highlight the phrases a language model picks for an instruction", long_about = None)]
struct Cli {
    /// 高亮什么，例如 "company names in the work history"
    #[arg(short, long)]
    instruction: Option<String>,

    /// 输入的 PDF 文件
    #[arg(value_name = "FILES")]
    files: Vec<PathBuf>,

    /// highlighted_<name> 输出目录
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// JSON 配置文件（默认：存在时使用 ./highlighter.json）
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// 填充颜色：yellow、green、blue、pink、orange 或 black
    #[arg(long)]
    color: Option<Palette>,

    /// 填充透明度，取值 (0, 1]
    #[arg(long)]
    opacity: Option<f32>,

    /// 注释类型：backdrop 或 highlight
    #[arg(long)]
    style: Option<AnnotationKind>,

    /// 文本后端：auto、pdfium 或 lopdf
    #[arg(long)]
    backend: Option<BackendKind>,

    /// 模型 API key
    #[arg(long, env = "HIGHLIGHTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// 模型名称
    #[arg(long)]
    model: Option<String>,

    /// OpenAI 兼容 API 的基础 URL
    #[arg(long)]
    base_url: Option<String>,

    /// 禁用 OCR 回退
    #[arg(long)]
    no_ocr: bool,

    /// 只把工作经历部分发送给模型
    #[arg(long)]
    focus_section: bool,

    /// 将默认配置写入 --config（或 ./highlighter.json）后退出
    #[arg(long)]
    init_config: bool,

    /// 打印生效的配置（API key 已遮盖）后退出
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// 命令行参数优先于配置文件和环境变量
    fn apply(&self, config: &mut AppConfig) {
        if let Some(color) = self.color {
            config.highlight.color = color;
        }
        if let Some(opacity) = self.opacity {
            config.highlight.opacity = opacity;
        }
        if let Some(kind) = self.style {
            config.highlight.kind = kind;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(key) = &self.api_key {
            config.oracle.api_key = Some(key.clone());
        }
        if let Some(model) = &self.model {
            config.oracle.model = model.clone();
        }
        if let Some(url) = &self.base_url {
            config.oracle.base_url = url.clone();
        }
        if self.no_ocr {
            config.ocr.enabled = false;
        }
        if self.focus_section {
            config.pipeline.focus_section = true;
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn run(cli: Cli) -> Result<ExitCode> {
    if cli.init_config {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(highlighter::config::DEFAULT_CONFIG_FILE));
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
        AppConfig::default()
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("wrote {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading config")?;
    config.apply_env().context("reading environment")?;
    cli.apply(&mut config);

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        return Ok(ExitCode::SUCCESS);
    }

    let pipeline_config = config.pipeline_config().context("invalid config")?;
    let instruction = cli.instruction.clone().unwrap_or_default();

    let mut inputs = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        inputs.push((file_name(path), bytes));
    }

    let backend = select_backend(config.backend).context("text backend")?;
    let oracle = ChatCompletionsOracle::new(&config.oracle).context("oracle client")?;
    let ocr = build_ocr(&config.ocr);
    let pipeline = DocumentPipeline::new(pipeline_config, backend, Box::new(oracle), ocr);

    let report = pipeline.process_batch(inputs, &instruction)?;

    fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("creating {}", cli.output_dir.display()))?;
    for document in &report.documents {
        println!("{}: {}", document.name, document.outcome);
        if let DocumentOutcome::Saved(saved) = &document.outcome {
            let out = cli.output_dir.join(&saved.output_name);
            fs::write(&out, &saved.bytes).with_context(|| format!("writing {}", out.display()))?;
            log::info!("[Cli] 已写入 {}", out.display());
        }
    }

    if report.saved_count() == 0 {
        log::warn!("[Cli] 没有保存任何文档");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

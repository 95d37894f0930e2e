//! `md2pdf` command line.
//!
//! ```text
//! md2pdf docs/ -o out/ --toc --footer --cover-title "Handbook"
//! md2pdf report.md -o report.pdf --config report.yaml --watermark-text DRAFT
//! md2pdf --list-styles
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;

use md2pdf::assets::asset_loader;
use md2pdf::types::FooterPosition;
use md2pdf::{
    BatchConverter, ConversionContext, ConverterConfig, CoverOptions, DocumentConfig,
    FooterOptions, Orientation, PageBreakOptions, PageSize, ServicePool, SignatureLink,
    SignatureOptions, TocOptions, WatermarkOptions,
};

#[derive(Debug, Parser)]
#[command(name = "md2pdf", version, about = "Convert Markdown files to styled PDF")]
struct Cli {
    /// Markdown file or directory (searched recursively)
    #[arg(required_unless_present = "list_styles")]
    input: Option<PathBuf>,

    /// Output file (single input) or directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// YAML file with document options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// CSS file replacing the style
    #[arg(long)]
    css: Option<PathBuf>,

    /// Built-in or --style-dir style name
    #[arg(short, long)]
    style: Option<String>,

    /// Directory with extra `<name>.css` styles
    #[arg(long)]
    style_dir: Option<PathBuf>,

    /// List available styles and exit
    #[arg(long)]
    list_styles: bool,

    // ===== Page =====
    /// letter, a4 or legal
    #[arg(long, help_heading = "Page")]
    page_size: Option<PageSize>,

    /// portrait or landscape
    #[arg(long, help_heading = "Page")]
    orientation: Option<Orientation>,

    /// Margin in inches (0.25 to 3.0)
    #[arg(long, help_heading = "Page")]
    margin: Option<f64>,

    // ===== Footer =====
    /// Add a footer with page numbers
    #[arg(long, help_heading = "Footer")]
    footer: bool,

    /// left, center or right
    #[arg(long, help_heading = "Footer")]
    footer_position: Option<FooterPosition>,

    #[arg(long, help_heading = "Footer")]
    footer_text: Option<String>,

    #[arg(long, help_heading = "Footer")]
    footer_date: Option<String>,

    /// Document status such as DRAFT
    #[arg(long, help_heading = "Footer")]
    footer_status: Option<String>,

    /// Leave page numbers out of the footer
    #[arg(long, help_heading = "Footer")]
    no_page_numbers: bool,

    // ===== Cover =====
    #[arg(long, help_heading = "Cover")]
    cover_title: Option<String>,

    #[arg(long, help_heading = "Cover")]
    cover_subtitle: Option<String>,

    /// Image path (relative to the working directory) or URL
    #[arg(long, help_heading = "Cover")]
    cover_logo: Option<String>,

    #[arg(long, help_heading = "Cover")]
    cover_author: Option<String>,

    #[arg(long, help_heading = "Cover")]
    cover_author_title: Option<String>,

    #[arg(long, help_heading = "Cover")]
    cover_organization: Option<String>,

    #[arg(long, help_heading = "Cover")]
    cover_date: Option<String>,

    #[arg(long, help_heading = "Cover")]
    cover_version: Option<String>,

    // ===== Table of contents =====
    /// Add a numbered table of contents
    #[arg(long, help_heading = "Table of contents")]
    toc: bool,

    #[arg(long, help_heading = "Table of contents")]
    toc_title: Option<String>,

    #[arg(long, help_heading = "Table of contents")]
    toc_min_depth: Option<u8>,

    #[arg(long, help_heading = "Table of contents")]
    toc_max_depth: Option<u8>,

    // ===== Signature =====
    #[arg(long, help_heading = "Signature")]
    signature_name: Option<String>,

    #[arg(long, help_heading = "Signature")]
    signature_title: Option<String>,

    #[arg(long, help_heading = "Signature")]
    signature_email: Option<String>,

    #[arg(long, help_heading = "Signature")]
    signature_organization: Option<String>,

    /// Image path (relative to the working directory) or URL
    #[arg(long, help_heading = "Signature")]
    signature_image: Option<String>,

    /// LABEL=URL, repeatable
    #[arg(long = "signature-link", value_parser = parse_link, help_heading = "Signature")]
    signature_links: Vec<SignatureLink>,

    // ===== Watermark =====
    #[arg(long, help_heading = "Watermark")]
    watermark_text: Option<String>,

    /// Hex color such as #888888
    #[arg(long, help_heading = "Watermark")]
    watermark_color: Option<String>,

    /// 0.0 to 1.0
    #[arg(long, help_heading = "Watermark")]
    watermark_opacity: Option<f64>,

    /// Degrees, -90 to 90
    #[arg(long, allow_hyphen_values = true, help_heading = "Watermark")]
    watermark_angle: Option<f64>,

    // ===== Page breaks =====
    /// Add page-break and pagination rules
    #[arg(long, help_heading = "Page breaks")]
    page_breaks: bool,

    /// Headings that start a new page, e.g. h1,h2
    #[arg(long, value_delimiter = ',', help_heading = "Page breaks")]
    break_before: Vec<String>,

    #[arg(long, help_heading = "Page breaks")]
    orphans: Option<u32>,

    #[arg(long, help_heading = "Page breaks")]
    widows: Option<u32>,

    // ===== Runtime =====
    /// Concurrent conversions (0 = automatic)
    #[arg(short, long, help_heading = "Runtime")]
    workers: Option<usize>,

    /// Browser operation timeout in seconds
    #[arg(long, help_heading = "Runtime")]
    timeout: Option<u64>,

    /// Chrome/Chromium binary
    #[arg(long, env = "CHROME_PATH", help_heading = "Runtime")]
    chrome_path: Option<PathBuf>,

    /// Run Chrome without its sandbox (containers)
    #[arg(long, help_heading = "Runtime")]
    no_sandbox: bool,

    /// Also write the final HTML next to each PDF
    #[arg(long, help_heading = "Runtime")]
    html: bool,

    /// More logging (debug)
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Errors only
    #[arg(short, long)]
    quiet: bool,
}

fn parse_link(value: &str) -> Result<SignatureLink, String> {
    match value.split_once('=') {
        Some((label, url)) if !label.trim().is_empty() && !url.trim().is_empty() => {
            Ok(SignatureLink {
                label: label.trim().to_string(),
                url: url.trim().to_string(),
            })
        }
        _ => Err(format!("expected LABEL=URL, got '{value}'")),
    }
}

/// Absolute form of a local image path given on the command line.
fn cli_image(src: &str) -> String {
    match md2pdf::types::ImageSource::resolve(src, None) {
        md2pdf::types::ImageSource::File(path) => path.display().to_string(),
        md2pdf::types::ImageSource::Url(url) => url,
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn base_config() -> anyhow::Result<ConverterConfig> {
    #[cfg(feature = "env-config")]
    {
        Ok(md2pdf::from_env()?)
    }
    #[cfg(not(feature = "env-config"))]
    {
        Ok(ConverterConfig::default())
    }
}

/// Converter settings: CLI over environment over defaults.
fn converter_config(cli: &Cli, doc: &DocumentConfig) -> anyhow::Result<ConverterConfig> {
    let mut config = base_config()?;

    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(seconds) = cli.timeout {
        if seconds == 0 {
            bail!("--timeout must be greater than 0");
        }
        config.timeout = Duration::from_secs(seconds);
    }
    if let Some(path) = &cli.chrome_path {
        config.chrome_path = Some(path.clone());
    }
    if cli.no_sandbox {
        config.sandbox = false;
    }
    if let Some(dir) = &cli.style_dir {
        config.style_dir = Some(dir.clone());
    }
    if let Some(style) = cli.style.as_ref().or(doc.style.as_ref()) {
        config.style = style.clone();
    }
    Ok(config)
}

/// Fold command-line options into the YAML document options.
fn apply_overrides(cli: &Cli, doc: &mut DocumentConfig) -> anyhow::Result<()> {
    if let Some(css) = &cli.css {
        doc.css = Some(css.clone());
    }

    if cli.page_size.is_some() || cli.orientation.is_some() || cli.margin.is_some() {
        let page = doc.page.get_or_insert_with(Default::default);
        if let Some(size) = cli.page_size {
            page.size = size;
        }
        if let Some(orientation) = cli.orientation {
            page.orientation = orientation;
        }
        if let Some(margin) = cli.margin {
            page.margin = margin;
        }
    }

    let wants_footer = cli.footer
        || cli.footer_position.is_some()
        || cli.footer_text.is_some()
        || cli.footer_date.is_some()
        || cli.footer_status.is_some()
        || cli.no_page_numbers;
    if wants_footer {
        let footer = doc.footer.get_or_insert_with(FooterOptions::default);
        if let Some(position) = cli.footer_position {
            footer.position = position;
        }
        set(&mut footer.text, &cli.footer_text);
        set(&mut footer.date, &cli.footer_date);
        set(&mut footer.status, &cli.footer_status);
        if cli.no_page_numbers {
            footer.page_number = false;
        }
    }

    let cover_fields = [
        &cli.cover_subtitle,
        &cli.cover_logo,
        &cli.cover_author,
        &cli.cover_author_title,
        &cli.cover_organization,
        &cli.cover_date,
        &cli.cover_version,
    ];
    if cli.cover_title.is_some() || cover_fields.iter().any(|f| f.is_some()) {
        let cover = doc.cover.get_or_insert_with(CoverOptions::default);
        if let Some(title) = &cli.cover_title {
            cover.title = title.clone();
        }
        set(&mut cover.subtitle, &cli.cover_subtitle);
        set(&mut cover.logo, &cli.cover_logo.as_deref().map(cli_image));
        set(&mut cover.author, &cli.cover_author);
        set(&mut cover.author_title, &cli.cover_author_title);
        set(&mut cover.organization, &cli.cover_organization);
        set(&mut cover.date, &cli.cover_date);
        set(&mut cover.version, &cli.cover_version);
    }

    if cli.toc || cli.toc_title.is_some() || cli.toc_min_depth.is_some() || cli.toc_max_depth.is_some() {
        let toc = doc.toc.get_or_insert_with(TocOptions::default);
        set(&mut toc.title, &cli.toc_title);
        if let Some(min) = cli.toc_min_depth {
            toc.min_depth = min;
        }
        if let Some(max) = cli.toc_max_depth {
            toc.max_depth = max;
        }
    }

    let signature_fields = [
        &cli.signature_title,
        &cli.signature_email,
        &cli.signature_organization,
        &cli.signature_image,
    ];
    if cli.signature_name.is_some()
        || signature_fields.iter().any(|f| f.is_some())
        || !cli.signature_links.is_empty()
    {
        let signature = doc.signature.get_or_insert_with(SignatureOptions::default);
        if let Some(name) = &cli.signature_name {
            signature.name = name.clone();
        }
        if signature.name.trim().is_empty() {
            bail!("a signature needs --signature-name");
        }
        set(&mut signature.title, &cli.signature_title);
        set(&mut signature.email, &cli.signature_email);
        set(&mut signature.organization, &cli.signature_organization);
        set(&mut signature.image, &cli.signature_image.as_deref().map(cli_image));
        signature.links.extend(cli.signature_links.iter().cloned());
    }

    let watermark_tweaks = cli.watermark_color.is_some()
        || cli.watermark_opacity.is_some()
        || cli.watermark_angle.is_some();
    if let Some(text) = &cli.watermark_text {
        doc.watermark
            .get_or_insert_with(|| WatermarkOptions::new(text.clone()))
            .text = text.clone();
    }
    if watermark_tweaks {
        let Some(watermark) = doc.watermark.as_mut() else {
            bail!("watermark options need --watermark-text");
        };
        if let Some(color) = &cli.watermark_color {
            watermark.color = color.clone();
        }
        if let Some(opacity) = cli.watermark_opacity {
            watermark.opacity = opacity;
        }
        if let Some(angle) = cli.watermark_angle {
            watermark.angle = angle;
        }
    }

    if cli.page_breaks || !cli.break_before.is_empty() || cli.orphans.is_some() || cli.widows.is_some() {
        let breaks = doc.page_breaks.get_or_insert_with(PageBreakOptions::default);
        if !cli.break_before.is_empty() {
            breaks.before_h1 = false;
            breaks.before_h2 = false;
            breaks.before_h3 = false;
            for heading in &cli.break_before {
                match heading.trim().to_ascii_lowercase().as_str() {
                    "h1" => breaks.before_h1 = true,
                    "h2" => breaks.before_h2 = true,
                    "h3" => breaks.before_h3 = true,
                    "" | "none" => {}
                    other => bail!("--break-before accepts h1, h2, h3 or none, got '{other}'"),
                }
            }
        }
        if let Some(orphans) = cli.orphans {
            breaks.orphans = orphans;
        }
        if let Some(widows) = cli.widows {
            breaks.widows = widows;
        }
    }

    Ok(())
}

fn set(target: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        *target = Some(value.clone());
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut doc = match &cli.config {
        Some(path) => DocumentConfig::load(path)?,
        None => DocumentConfig::default(),
    };
    let config = converter_config(&cli, &doc)?;

    if cli.list_styles {
        for name in asset_loader(config.style_dir.as_deref()).available_styles() {
            println!("{name}");
        }
        return Ok(ExitCode::SUCCESS);
    }
    let Some(input) = cli.input.clone() else {
        bail!("an input file or directory is required");
    };

    apply_overrides(&cli, &mut doc)?;
    let template = doc.into_input().context("failed to prepare document options")?;
    template.validate_layout()?;

    let ctx = ConversionContext::new();
    let signal_ctx = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("🛑 Interrupted, cancelling conversions...");
            signal_ctx.cancel();
        }
    });

    let pool = Arc::new(ServicePool::from_config(&config));
    let batch = BatchConverter::new(Arc::clone(&pool), template).with_html_output(cli.html);
    let outcome = batch.run(&ctx, &input, cli.output.as_deref()).await;

    if let Err(e) = pool.close() {
        log::warn!("⚠️ Error while closing browsers: {}", e);
    }
    let report = outcome?;

    if report.results.is_empty() {
        eprintln!("No Markdown files found in {}", input.display());
        return Ok(ExitCode::FAILURE);
    }
    for result in &report.results {
        match &result.error {
            None => println!(
                "✓ {} → {} ({:.1}s)",
                result.input.display(),
                result.output.display(),
                result.duration.as_secs_f64()
            ),
            Some(e) => eprintln!("✗ {}: {}", result.input.display(), e),
        }
    }
    println!("{} converted, {} failed", report.succeeded(), report.failed);

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

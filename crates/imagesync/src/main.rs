mod progress;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use imagesync_config::ProviderConfig;
use imagesync_core::{Acquisition, ImageReference, ImageResource, ImageState, load_resource};
use imagesync_engine::{DockerDaemon, ImageController, ImageError, RemovedItem};
use progress::CycleProgress;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_RESOURCE_FILE: &str = "image.yaml";

#[derive(Parser)]
#[command(name = "imagesync")]
#[command(about = "宣言したイメージを、ローカルとレジストリに揃える。", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// プロバイダー設定ファイル（省略時は自動探索）
    #[arg(long, global = true, env = "IMAGESYNC_CONFIG")]
    config: Option<PathBuf>,

    /// 結果をJSONで出力
    #[arg(long, global = true)]
    json: bool,

    /// 詳細ログとデーモン出力を表示
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// イメージを用意する（ローカル検索 → pull / ビルド → プッシュ）
    Create {
        /// イメージ定義ファイル
        #[arg(short, long, default_value = DEFAULT_RESOURCE_FILE)]
        file: PathBuf,
    },
    /// ローカルのイメージ状態を表示
    Read {
        /// イメージ定義ファイル
        #[arg(short, long, conflicts_with = "name")]
        file: Option<PathBuf>,
        /// イメージ名を直接指定
        #[arg(short, long)]
        name: Option<String>,
    },
    /// イメージを取得し直す（ビルドはしない）
    Update {
        /// イメージ定義ファイル
        #[arg(short, long, default_value = DEFAULT_RESOURCE_FILE)]
        file: PathBuf,
    },
    /// ローカルのイメージを削除
    Delete {
        /// イメージ定義ファイル
        #[arg(short, long, default_value = DEFAULT_RESOURCE_FILE)]
        file: PathBuf,
    },
    /// イメージ名を解析して表示
    Parse {
        /// イメージ名（例: localhost:5000/app:dev）
        name: String,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // イメージ定義はデーモン接続前に読み込む
    match &cli.command {
        Commands::Version => {
            println!("imagesync {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Parse { name } => {
            print_reference(&ImageReference::parse(name), cli.json)?;
        }
        Commands::Create { file } => {
            let resource = load(file)?;
            let controller = connect(&cli)?;
            let progress = CycleProgress::new("Creating", &resource.name, !cli.json);
            match controller.create(&resource).await {
                Ok(state) => {
                    progress.finish_success(&format!("{} is ready", resource.name));
                    print_state(&state, cli.json, cli.verbose)?;
                }
                Err(err) => return Err(report_failure(&progress, err)),
            }
        }
        Commands::Update { file } => {
            let resource = load(file)?;
            let controller = connect(&cli)?;
            let progress = CycleProgress::new("Updating", &resource.name, !cli.json);
            match controller.update(&resource).await {
                Ok(state) => {
                    progress.finish_success(&format!("{} is up to date", resource.name));
                    print_state(&state, cli.json, cli.verbose)?;
                }
                Err(err) => return Err(report_failure(&progress, err)),
            }
        }
        Commands::Delete { file } => {
            let resource = load(file)?;
            let controller = connect(&cli)?;
            let progress = CycleProgress::new("Deleting", &resource.name, !cli.json);
            match controller.delete(&resource).await {
                Ok(removed) => {
                    progress.finish_success(&format!("{} deleted", resource.name));
                    print_removed(&resource, &removed, cli.json)?;
                }
                Err(err) => return Err(report_failure(&progress, err)),
            }
        }
        Commands::Read { file, name } => {
            let name = match name {
                Some(name) => name.clone(),
                None => load(file.as_deref().unwrap_or(Path::new(DEFAULT_RESOURCE_FILE)))?.name,
            };
            let controller = connect(&cli)?;
            match controller.read(&name).await? {
                Some(state) => print_state(&state, cli.json, cli.verbose)?,
                None if cli.json => println!("null"),
                None => println!("{} {} はローカルに存在しません", "ℹ".yellow(), name.bold()),
            }
        }
    }

    Ok(())
}

/// プロバイダー設定を読み込み、デーモンに接続する
fn connect(cli: &Cli) -> anyhow::Result<ImageController<DockerDaemon>> {
    let provider = match &cli.config {
        Some(path) => ProviderConfig::load(path)
            .with_context(|| format!("設定ファイルの読み込みに失敗: {}", path.display()))?,
        None => ProviderConfig::discover().context("設定ファイルの読み込みに失敗")?,
    };
    let credentials = provider
        .credential_table()
        .context("レジストリ認証情報の読み込みに失敗")?;
    tracing::debug!("Registry credentials: {:?}", credentials.registries());

    let daemon = DockerDaemon::connect(provider.host.as_deref())?;
    Ok(ImageController::new(daemon, credentials))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> anyhow::Result<ImageResource> {
    load_resource(path)
        .with_context(|| format!("イメージ定義の読み込みに失敗: {}", path.display()))
}

/// 失敗を表示し、デーモン出力があれば併せて出す
fn report_failure(progress: &CycleProgress, err: ImageError) -> anyhow::Error {
    progress.finish_error("failed");

    // ビルド失敗はエラーメッセージ自体にログを含む
    if !matches!(err, ImageError::Build { .. })
        && let Some(output) = err.output()
    {
        eprintln!("{}", "Daemon output:".bold());
        eprintln!("{}", output.dimmed());
    }

    anyhow::Error::new(err)
}

fn acquisition_label(acquisition: Acquisition) -> &'static str {
    match acquisition {
        Acquisition::Local => "local",
        Acquisition::Pulled => "pulled",
        Acquisition::Built => "built",
    }
}

fn print_state(state: &ImageState, json: bool, verbose: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(state)?);
        return Ok(());
    }

    println!("{}", state.name.bold());
    println!("  {:<8} {}", "id:", state.id);
    println!("  {:<8} {}", "latest:", state.latest.cyan());
    if let Some(acquisition) = state.acquired_via {
        println!("  {:<8} {}", "via:", acquisition_label(acquisition).green());
    }

    if verbose {
        for (label, output) in [
            ("build output", &state.build_output),
            ("pull output", &state.pull_output),
            ("push output", &state.push_output),
        ] {
            if let Some(output) = output {
                println!();
                println!("{}", label.bold());
                print!("{}", output.dimmed());
            }
        }
    }

    Ok(())
}

fn print_removed(
    resource: &ImageResource,
    removed: &[RemovedItem],
    json: bool,
) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(removed)?);
        return Ok(());
    }

    if removed.is_empty() {
        let reason = if resource.keep_locally {
            "keep_locally が有効です"
        } else {
            "ローカルに存在しません"
        };
        println!("  {} 削除するイメージはありません（{}）", "ℹ".yellow(), reason);
        return Ok(());
    }

    for item in removed {
        match item {
            RemovedItem::Untagged(tag) => println!("  Untagged: {}", tag),
            RemovedItem::Deleted(id) => println!("  Deleted:  {}", id.red()),
        }
    }
    Ok(())
}

fn print_reference(reference: &ImageReference, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reference)?);
        return Ok(());
    }

    let or_none = |value: &str| {
        if value.is_empty() {
            "(none)".dimmed().to_string()
        } else {
            value.to_string()
        }
    };

    println!("{}", reference.raw.bold());
    println!("  {:<11} {}", "registry:", or_none(&reference.registry));
    println!("  {:<11} {}", "repository:", reference.repository.cyan());
    println!("  {:<11} {}", "tag:", or_none(&reference.tag));
    println!("  {:<11} {}", "full name:", reference.fully_qualified_name);
    Ok(())
}

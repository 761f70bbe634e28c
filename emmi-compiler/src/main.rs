use std::fs;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value as Json;
use tracing::Level;

use emmi_compiler::blockly::block_map::BlockTypeMap;
use emmi_compiler::blockly::exporter::export;
use emmi_compiler::blockly::mapper::load_program_into_workspace;
use emmi_compiler::blockly::workspace::Workspace;
use emmi_compiler::blockly::{BlockDescriptor, DescriptorRef};
use emmi_compiler::ir::command::SIMPLE_COMMANDS;
use emmi_compiler::sanitize::sanitize_document;
use emmi_compiler::script;
use emmi_compiler::synth::generator::{CannedGenerator, OfflineGenerator};
use emmi_compiler::synth::{DEFAULT_TIMEOUT_MS, Translation, Translator};

#[derive(Parser)]
#[command(name = "emmi")]
#[command(about = "Toolchain for EMMI robot programs", version)]
struct Cli {
    /// Подробный лог (debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Собирает token script из дерева блоков (JSON)
    Export {
        /// Дерево блоков: корневой блок или список верхних блоков
        input: String,

        /// Показать по одному токену на строку
        #[arg(long)]
        pretty: bool,
    },

    /// Чистит документ программы и печатает результат
    Sanitize {
        /// Документ {program, explanation, warnings} или голая программа
        input: String,
    },

    /// Чистит документ и печатает token script
    Compile {
        input: String,
    },

    /// Раскладывает программу обратно в блоки
    Map {
        input: String,

        /// Своя таблица типов блоков (JSON)
        #[arg(long)]
        block_map: Option<String>,

        /// Заново экспортировать загруженные блоки
        #[arg(long)]
        export: bool,
    },

    /// Переводит текстовый запрос в программу
    Translate {
        /// Запрос, например "blink the blue led every 2 seconds"
        message: String,

        /// Готовый ответ генератора вместо внешнего сервиса
        #[arg(long)]
        response_file: Option<String>,

        /// Таймаут генератора в миллисекундах
        #[arg(long, env = "EMMI_GENERATOR_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
        timeout_ms: u64,
    },

    /// Проверяет структуру token script
    Check {
        script: String,
    },

    /// Список команд робота
    Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Export { input, pretty } => {
            let roots = read_blocks(&input)?;
            let exported = export(roots.iter().map(DescriptorRef::new))?;
            if pretty {
                println!("{}", exported.pretty);
            } else {
                println!("{}", exported.script);
            }
        }
        Commands::Sanitize { input } => {
            let raw: Json = serde_json::from_str(&fs::read_to_string(&input)?)?;
            let document = sanitize_document(&raw);
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        Commands::Compile { input } => {
            let raw: Json = serde_json::from_str(&fs::read_to_string(&input)?)?;
            let document = sanitize_document(&raw);
            for warning in &document.warnings {
                eprintln!("warning: {}", warning);
            }
            let text = script::serialize(&document.program)?;
            script::validate_script(&text)?;
            println!("{}", text);
        }
        Commands::Map { input, block_map, export: reexport } => {
            let raw: Json = serde_json::from_str(&fs::read_to_string(&input)?)?;
            let document = sanitize_document(&raw);
            let map = match block_map {
                Some(path) => BlockTypeMap::from_json(&fs::read_to_string(path)?)?,
                None => BlockTypeMap::default(),
            };

            let mut workspace = Workspace::default();
            let mut result = load_program_into_workspace(&mut workspace, &document.program, &map);
            // предупреждения санитайзера идут первыми
            let mut warnings = document.warnings;
            warnings.append(&mut result.warnings);
            result.warnings = warnings;
            println!("{}", serde_json::to_string_pretty(&result)?);

            if reexport {
                let exported = export(workspace.top_blocks())?;
                println!("{}", exported.script);
            }
        }
        Commands::Translate { message, response_file, timeout_ms } => {
            let timeout = Duration::from_millis(timeout_ms);
            let translation: Translation = match response_file {
                Some(path) => {
                    let reply = fs::read_to_string(path)?;
                    Translator::new(CannedGenerator::new(reply))
                        .with_timeout(timeout)
                        .translate(&message)
                        .await
                }
                None => Translator::new(OfflineGenerator).with_timeout(timeout).translate(&message).await,
            };
            println!("{}", serde_json::to_string_pretty(&translation)?);
        }
        Commands::Check { script: text } => {
            script::validate_script(&text)?;
            println!("OK");
        }
        Commands::Commands => {
            println!("Supported commands:");
            for command in SIMPLE_COMMANDS.iter() {
                println!("  {:6} - {} [{}]", command.token(), command.description(), command.init_flag().code());
            }
            println!("  {:6} - buzzer tone at <hz> Hz [B]", "BF<hz>");
            println!("  {:6} - play melody <name> [B]", "BP<name>");
        }
    }

    Ok(())
}

/// A single root block or a list of top blocks.
fn read_blocks(path: &str) -> Result<Vec<BlockDescriptor>, Box<dyn std::error::Error>> {
    let raw: Json = serde_json::from_str(&fs::read_to_string(path)?)?;
    let blocks = match raw {
        Json::Array(_) => serde_json::from_value(raw)?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(blocks)
}

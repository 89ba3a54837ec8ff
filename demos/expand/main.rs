//! # jsonfig expand demo
//!
//! A small CLI that loads a JSON config and expands macros in it. It exists to
//! demonstrate and manually verify jsonfig's tree and macro engine.
//!
//! ## Running
//!
//! ```sh
//! cargo run --features cli --example expand -- --config demos/expand/service.json render "[name] on port [server/port]"
//! cargo run --features cli --example expand -- --config demos/expand/service.json --node server field banner
//! cargo run --features cli --example expand -- --config demos/expand/service.json resolve
//! RUST_LOG=jsonfig=trace cargo run --features cli --example expand -- --config demos/expand/service.json render "[missing] EVAL(1/0)"
//! ```
//!
//! | Command   | What it shows                                                      |
//! |-----------|--------------------------------------------------------------------|
//! | `render`  | Expand ad-hoc templates against a node                             |
//! | `field`   | Expand one string field of a node                                  |
//! | `resolve` | Expand every string field in the subtree and print (or save) it    |

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use jsonfig::{ConfigNode, ConfigValue, JsonfigError, MacroEngine};

/// jsonfig expand: render config macros from the command line.
#[derive(Parser, Debug)]
#[command(name = "expand")]
struct Cli {
    /// JSON config file to load.
    #[arg(long, global = true, default_value = "demos/expand/service.json")]
    config: PathBuf,

    /// Context node, as a `/`-separated path of child keys (default: root).
    #[arg(long, global = true)]
    node: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Expand the given templates.
    Render { templates: Vec<String> },
    /// Expand the string stored under KEY in the context node.
    Field { key: String },
    /// Expand every string field below the context node.
    Resolve {
        /// Write the expanded document back to the config file.
        #[arg(long)]
        write: bool,
    },
}

fn select(root: &ConfigNode, path: Option<&str>) -> Option<ConfigNode> {
    let mut current = root.clone();
    for segment in path.unwrap_or_default().split('/').filter(|s| !s.is_empty()) {
        current = current.get_config(segment)?;
    }
    Some(current)
}

/// Expand string fields in place, depth first. Each string is expanded with
/// the node that holds it as context.
fn resolve(engine: &MacroEngine, node: &ConfigNode) -> Result<usize, JsonfigError> {
    let mut expanded = 0;
    for key in node.keys() {
        if let Some(child) = node.get_config(&key) {
            expanded += resolve(engine, &child)?;
        } else if let Some(ConfigValue::String(text)) = node.get(&key) {
            let out = engine.process(&text, node)?;
            if out != text {
                node.set_string(&key, out);
                expanded += 1;
            }
        }
    }
    Ok(expanded)
}

fn run(cli: Cli) -> Result<(), JsonfigError> {
    let root = ConfigNode::load_file(&cli.config)?;
    let Some(context) = select(&root, cli.node.as_deref()) else {
        eprintln!("No such node: {}", cli.node.unwrap_or_default());
        std::process::exit(1);
    };
    let engine = MacroEngine::new();

    match cli.command {
        Commands::Render { templates } => {
            for line in engine.process_all(&templates, &context)? {
                println!("{line}");
            }
        }
        Commands::Field { key } => match context.get_string(&key)? {
            Some(text) => println!("{}", engine.process(&text, &context)?),
            None => {
                eprintln!("No such key: {key}");
                std::process::exit(1);
            }
        },
        Commands::Resolve { write } => {
            let count = resolve(&engine, &context)?;
            tracing::info!(count, "expanded string fields");
            if write {
                root.save_file(&cli.config)?;
                println!("Wrote {}", cli.config.display());
            } else {
                println!("{}", context.to_json_string_pretty());
            }
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error:\n{e}");
        std::process::exit(1);
    }
}

//! Command-line interface: `weft generate`, `weft parse`, `weft validate`.

use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::interpreter::GenerateOptions;
use crate::strategy::FileSystemStrategy;
use crate::validate::validate;
use crate::value::{ModelResource, Value};

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Model-to-text template engine for the MOFM2T/Acceleo MTL dialect")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Diagnostic logging at statement and scope boundaries
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate text from a template module
    Generate {
        /// Template source file
        template: Option<PathBuf>,

        /// Template to execute (overrides auto-detection)
        #[arg(long)]
        main_template: Option<String>,

        /// Model to register, as ALIAS=PATH (JSON document)
        #[arg(long = "model", value_name = "ALIAS=PATH")]
        models: Vec<String>,

        /// Root-scope argument, as NAME=JSON
        #[arg(long = "arg", value_name = "NAME=JSON")]
        arguments: Vec<String>,

        /// Base directory for generated files
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Default output encoding
        #[arg(long)]
        charset: Option<String>,

        /// Project manifest (defaults to weft.toml when present)
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Parse a template module and print it back
    Parse {
        /// Template source file
        template: PathBuf,

        /// Dump the module AST as JSON instead of template source
        #[arg(long)]
        json: bool,
    },
    /// Parse a template module and report static problems
    Validate {
        /// Template source file
        template: PathBuf,
    },
}

/// Project manifest: flags override its entries.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Manifest {
    pub template: Option<PathBuf>,
    pub main_template: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub charset: Option<String>,
    pub models: IndexMap<String, PathBuf>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        let manifest = toml::from_str(&text)
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        Ok(manifest)
    }
}

/// Entry point for the CLI.
pub fn run_cli() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    let _ = logger.try_init();

    match cli.command {
        Commands::Generate {
            template,
            main_template,
            models,
            arguments,
            output_dir,
            charset,
            manifest,
        } => cmd_generate(
            template,
            main_template,
            models,
            arguments,
            output_dir,
            charset,
            manifest,
            cli.debug,
        ),
        Commands::Parse { template, json } => cmd_parse(&template, json),
        Commands::Validate { template } => cmd_validate(&template),
    }
}

fn parse_template_file(path: &Path) -> Result<crate::Module, Box<dyn std::error::Error>> {
    let source =
        fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    match crate::parse(&source) {
        Ok(module) => Ok(module),
        Err(e) => {
            eprintln!("{}", e.display_with_source(&source));
            Err(format!("failed to parse {}", path.display()).into())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_generate(
    template: Option<PathBuf>,
    main_template: Option<String>,
    models: Vec<String>,
    arguments: Vec<String>,
    output_dir: Option<PathBuf>,
    charset: Option<String>,
    manifest: Option<PathBuf>,
    debug: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = match manifest {
        Some(path) => Manifest::load(&path)?,
        None if Path::new("weft.toml").exists() => Manifest::load(Path::new("weft.toml"))?,
        None => Manifest::default(),
    };

    let template_path = template
        .or(manifest.template)
        .ok_or("no template given (pass one or set `template` in weft.toml)")?;
    let module = parse_template_file(&template_path)?;

    let mut options = GenerateOptions {
        main_template: main_template.or(manifest.main_template),
        charset: charset.or(manifest.charset),
        debug,
        ..Default::default()
    };
    for (alias, path) in &manifest.models {
        options.models.insert(alias.clone(), load_model(path)?);
    }
    for entry in &models {
        let (alias, path) = split_entry(entry, "--model")?;
        options
            .models
            .insert(alias.to_string(), load_model(Path::new(path))?);
    }
    for entry in &arguments {
        let (name, json) = split_entry(entry, "--arg")?;
        let parsed: serde_json::Value =
            serde_json::from_str(json).map_err(|e| format!("argument '{}': {}", name, e))?;
        options.arguments.insert(name.to_string(), Value::from_json(&parsed));
    }

    let root = output_dir.or(manifest.output_dir).unwrap_or_else(|| PathBuf::from("."));
    let strategy = Arc::new(FileSystemStrategy::new(root));
    let result = crate::generate(module, options, strategy)?;

    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
    }
    if debug {
        let stats = &result.stats;
        eprintln!(
            "generated {} file(s), {} template(s) executed, {} protected region(s) preserved in {:?}",
            stats.files_generated,
            stats.templates_executed,
            stats.protected_areas_preserved,
            stats.duration.unwrap_or_default()
        );
    }
    Ok(())
}

fn cmd_parse(template: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let module = parse_template_file(template)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&module)?);
    } else {
        print!("{}", crate::printer::print_module(&module));
    }
    Ok(())
}

fn cmd_validate(template: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let module = parse_template_file(template)?;
    let issues = validate(&module);
    if issues.is_empty() {
        println!("{}: OK", template.display());
        Ok(())
    } else {
        for issue in &issues {
            eprintln!("{}: {}", template.display(), issue);
        }
        Err(format!("{} validation issue(s)", issues.len()).into())
    }
}

fn load_model(path: &Path) -> Result<ModelResource, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| format!("{}: {}", path.display(), e))?;
    Ok(ModelResource::from_json(value))
}

fn split_entry<'a>(
    entry: &'a str,
    flag: &str,
) -> Result<(&'a str, &'a str), Box<dyn std::error::Error>> {
    entry
        .split_once('=')
        .ok_or_else(|| format!("{} expects NAME=VALUE, got '{}'", flag, entry).into())
}

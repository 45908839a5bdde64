use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use colored::Colorize;
use conflate_engine::{ConfigFile, Coordinator, EngineSettings, Job, RunSummary};
use conflate_store::{ImportSummary, SqliteProvider};
use conflate_tokenize::{TokenTable, Tokenizer};
use conflate_types::Context;
use tokio::io::AsyncWrite;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args, &cli.format),
        Command::Import(args) => cmd_import(args, &cli.format),
        Command::Tokenize(args) => cmd_tokenize(args),
    }
}

fn cmd_run(args: RunArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let summary = execute_run(&args)?;
    print_run_summary(&summary, format)
}

fn execute_run(args: &RunArgs) -> anyhow::Result<RunSummary> {
    let settings = match &args.config {
        Some(path) => ConfigFile::load(path)?.engine,
        None => EngineSettings::default(),
    };
    let mut job = Job::new(&args.in_address)
        .with_context(Context::new(args.country.clone(), args.region.clone()))
        .with_settings(settings.clone());
    if let Some(workers) = args.workers {
        job = job.with_workers(workers);
    }
    if let Some(table) = load_tokens(&args.tokens, args.token_file.as_deref())? {
        job = job.with_tokens(table);
    }
    if let Some(mapping) = &args.map_address {
        job = job.with_mapping(mapping);
    }
    job.validate()?;

    let provider = SqliteProvider::open(&args.db, settings.max_connections)
        .with_context(|| format!("opening database {}", args.db.display()))?;
    if let Some(corpus) = &args.in_persistent {
        let imported = import_corpus(&provider, corpus, args.error_persistent.as_deref())?;
        eprintln!(
            "{} Imported {} known addresses ({} rejected)",
            "✓".green(),
            imported.imported.to_string().bold(),
            imported.rejected
        );
    }

    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime.block_on(async {
        let coordinator = Coordinator::new(job, Arc::new(provider));
        let mut errors = match &args.error_output {
            Some(path) => Some(
                tokio::fs::File::create(path)
                    .await
                    .with_context(|| format!("creating {}", path.display()))?,
            ),
            None => None,
        };
        let errors = errors
            .as_mut()
            .map(|f| f as &mut (dyn AsyncWrite + Unpin + Send));

        let summary = match &args.output {
            Some(path) => {
                let file = tokio::fs::File::create(path)
                    .await
                    .with_context(|| format!("creating {}", path.display()))?;
                coordinator.run(file, errors).await?
            }
            None => coordinator.run(tokio::io::stdout(), errors).await?,
        };
        anyhow::Ok(summary)
    })
}

fn cmd_import(args: ImportArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let provider = SqliteProvider::open(&args.db, args.max_connections)
        .with_context(|| format!("opening database {}", args.db.display()))?;
    let summary = import_corpus(&provider, &args.in_persistent, args.error_persistent.as_deref())?;
    match format {
        OutputFormat::Json => {
            let doc = serde_json::json!({"imported": summary.imported, "rejected": summary.rejected});
            eprintln!("{doc}");
        }
        OutputFormat::Text => {
            eprintln!(
                "{} Imported {} known addresses into {}",
                "✓".green().bold(),
                summary.imported.to_string().bold(),
                args.db.display()
            );
            if summary.rejected > 0 {
                eprintln!("  {} {} lines rejected", "!".yellow(), summary.rejected);
            }
        }
    }
    Ok(())
}

fn cmd_tokenize(args: TokenizeArgs) -> anyhow::Result<()> {
    let table = load_tokens(&args.tokens, args.token_file.as_deref())?;
    println!("{}", Tokenizer::new(table).normalize(&args.name));
    Ok(())
}

/// Built-in tables for `codes`, overridden by the groups in `file`.
fn load_tokens(codes: &[String], file: Option<&Path>) -> anyhow::Result<Option<TokenTable>> {
    let builtin = if codes.is_empty() {
        None
    } else {
        Some(TokenTable::for_languages(codes)?)
    };
    let custom = match file {
        Some(path) => Some(
            TokenTable::from_json_file(path).with_context(|| format!("loading token table {}", path.display()))?,
        ),
        None => None,
    };
    Ok(match (custom, builtin) {
        (Some(mut custom), Some(builtin)) => {
            custom.merge(builtin);
            Some(custom)
        }
        (custom, builtin) => custom.or(builtin),
    })
}

fn import_corpus(provider: &SqliteProvider, path: &Path, rejects: Option<&Path>) -> anyhow::Result<ImportSummary> {
    let reader = BufReader::new(File::open(path).with_context(|| format!("opening {}", path.display()))?);
    let mut reject_out = match rejects {
        Some(p) => Some(BufWriter::new(
            File::create(p).with_context(|| format!("creating {}", p.display()))?,
        )),
        None => None,
    };
    let summary = provider.import_persistent(reader, reject_out.as_mut().map(|w| w as &mut dyn Write))?;
    if let Some(mut out) = reject_out {
        out.flush()?;
    }
    Ok(summary)
}

fn print_run_summary(summary: &RunSummary, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => eprintln!("{}", serde_json::to_string(summary)?),
        OutputFormat::Text => {
            eprintln!("{} Conflation complete ({} workers)", "✓".green().bold(), summary.workers);
            eprintln!("  Lines:    {}", summary.lines);
            eprintln!("  Created:  {}", summary.created.to_string().green());
            eprintln!(
                "  Modified: {} ({} staged)",
                summary.modified.to_string().cyan(),
                summary.staged
            );
            eprintln!("  Dropped:  {}", summary.dropped.to_string().dimmed());
            if summary.rejected > 0 {
                eprintln!("  Rejected: {}", summary.rejected.to_string().yellow());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(dir: &Path) -> RunArgs {
        RunArgs {
            in_address: dir.join("in.geojson"),
            db: dir.join("conflate.db"),
            output: Some(dir.join("out.geojson")),
            in_persistent: Some(dir.join("known.geojson")),
            error_persistent: None,
            error_output: Some(dir.join("bad.jsonl")),
            workers: Some(2),
            country: None,
            region: None,
            tokens: vec!["en".into()],
            token_file: None,
            map_address: Some("openaddresses".into()),
            config: None,
        }
    }

    #[test]
    fn load_tokens_combines_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, r#"[["nw", "northwest"], ["st", "saint"]]"#).unwrap();

        let table = load_tokens(&["en".into()], Some(path.as_path())).unwrap().unwrap();
        assert_eq!(table.replace("northwest"), "nw");
        assert_eq!(table.replace("saint"), "st");
        assert_eq!(table.replace("street"), "st");

        assert!(load_tokens(&[], None).unwrap().is_none());
        assert!(load_tokens(&["xx".into()], None).is_err());
        assert!(load_tokens(&[], Some(Path::new("/no/such/file.json"))).is_err());
    }

    #[test]
    fn run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let args = run_args(dir.path());
        std::fs::write(
            dir.path().join("known.geojson"),
            concat!(
                r#"{"id":1,"version":1,"properties":{"number":"10","street":[{"display":"Main St","priority":0}]},"geometry":{"type":"Point","coordinates":[0,0]}}"#,
                "\n"
            ),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("in.geojson"),
            concat!(
                r#"{"properties":{"number":"10","street":"Main Street"},"geometry":{"type":"Point","coordinates":[0,0]}}"#,
                "\n",
                r#"{"properties":{"number":"12","street":"Main St"},"geometry":{"type":"Point","coordinates":[0,0]}}"#,
                "\n",
                "not json\n",
            ),
        )
        .unwrap();

        let summary = execute_run(&args).unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.rejected, 1);

        let out = std::fs::read_to_string(dir.path().join("out.geojson")).unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.contains(r#""action":"create""#));
        let bad = std::fs::read_to_string(dir.path().join("bad.jsonl")).unwrap();
        assert!(bad.contains("not json"));
    }

    #[test]
    fn run_rejects_bad_config_before_touching_db() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = run_args(dir.path());
        std::fs::write(&args.in_address, "").unwrap();
        args.workers = Some(0);
        assert!(execute_run(&args).is_err());
        assert!(!args.db.exists());
    }
}

use clap::Parser;
use coverbert::{
    DataDir,
    FlatL2Index,
    ModelManager,
    Retriever,
    builder,
    cli::{self, Cli, Command},
    error,
    prompt,
    retriever,
};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("COVERBERT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let model = ModelManager::resolve(cli.model.as_deref());

    match cli.command {
        Command::Build(args) => cmd_build(&data_dir, model, &args)?,
        Command::Search(args) => cmd_search(&data_dir, model, &args)?,
        Command::Prompt(args) => cmd_prompt(&data_dir, model, &args)?,
        Command::Status(args) => cmd_status(&data_dir, args.json)?,
        Command::Completions(_) => {}
    }

    Ok(())
}

fn cmd_build(
    data_dir: &DataDir,
    mut model: ModelManager,
    args: &cli::BuildArgs,
) -> error::Result<()> {
    let source = args
        .source
        .clone()
        .unwrap_or_else(|| data_dir.raw_corpus());
    let paths = data_dir.artifacts();

    eprintln!("Building index from {}...", source.display());
    let summary = builder::build(&mut model, &source, &paths)?;

    if args.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!("total: {}", summary.corpus.total);
        println!("kept: {}", summary.corpus.kept);
        println!("dropped: {}", summary.corpus.dropped);
        println!("dimension: {}", summary.dimension);
        println!("Index written to {}", paths.index.display());
    }
    Ok(())
}

fn cmd_search(
    data_dir: &DataDir,
    model: ModelManager,
    args: &cli::SearchArgs,
) -> error::Result<()> {
    let retriever = Retriever::open(data_dir.artifacts(), model)?;
    let results = retriever.search_scored(&args.query, args.k)?;

    if args.json {
        retriever::format_json(&results, &args.query)?;
    } else {
        retriever::format_human(&results, args.full);
    }
    Ok(())
}

fn cmd_prompt(
    data_dir: &DataDir,
    model: ModelManager,
    args: &cli::PromptArgs,
) -> error::Result<()> {
    if !args.summary.exists() {
        return Err(error::Error::missing_path(
            "candidate summary",
            &args.summary,
        ));
    }
    let candidate_summary = std::fs::read_to_string(&args.summary)?;
    let static_path = args
        .static_summary
        .clone()
        .unwrap_or_else(|| data_dir.static_summary());
    let static_summary = prompt::load_static_summary(&static_path)?;

    let retriever = Retriever::open(data_dir.artifacts(), model)?;
    let text = prompt::compose_with_retrieval(
        &retriever,
        &args.vacancy,
        candidate_summary.trim(),
        &static_summary,
        args.k,
    )?;
    println!("{text}");
    Ok(())
}

fn cmd_status(data_dir: &DataDir, json: bool) -> error::Result<()> {
    let paths = data_dir.artifacts();
    let missing = paths.missing();

    let index = if paths.index.exists() {
        Some(FlatL2Index::load(&paths.index)?)
    } else {
        None
    };

    if json {
        let status = serde_json::json!({
            "data_dir": data_dir.root().display().to_string(),
            "built": missing.is_empty(),
            "missing": missing
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>(),
            "records": index.as_ref().map(|(i, _)| i.len()),
            "dimension": index.as_ref().map(|(i, _)| i.dimension()),
            "model": index.as_ref().map(|(_, m)| m.model_id.clone()),
        });
        println!("{status}");
    } else {
        println!("Data directory: {}", data_dir.root().display());
        match &index {
            Some((index, meta)) => {
                println!("Model: {}", meta.model_id);
                println!("Records: {}", index.len());
                println!("Dimension: {}", index.dimension());
            }
            None => println!("No index built yet."),
        }
        for path in &missing {
            println!("Missing: {}", path.display());
        }
    }
    Ok(())
}

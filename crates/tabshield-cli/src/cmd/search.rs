use crate::reports;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tabshield_core::{
    BackendConfig, CellTable, GenomeSource, GroupSource, HttpBackend, PrimaryCellSource,
    SearchBuildParams, SearchError, SearchParams, SearchResult,
};
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Input table uploaded to the solver for every yplus evaluation
    #[arg(short = 't', long)]
    pub table: PathBuf,

    /// Cell summary CSV (index,status,weight); genes are its primary cells
    #[arg(short = 'c', long, conflicts_with = "groups", required_unless_present = "groups")]
    pub cells: Option<PathBuf>,

    /// Number of cell groups; genes are group indices
    #[arg(short = 'g', long)]
    pub groups: Option<usize>,

    /// JSON file with search parameters; replaces the flags below
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub params: SearchParams,

    /// Stop after this many generations
    #[arg(long)]
    pub generations: Option<usize>,

    /// Use the worst parent's fitness as the cost ceiling for clones
    #[arg(long, default_value_t = false)]
    pub limit_cost: bool,

    /// Where to write the best pattern's output table
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Print the summary as JSON instead of a table
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

fn genome_source(args: &SearchArgs) -> SearchResult<Arc<dyn GenomeSource>> {
    match (&args.cells, args.groups) {
        (Some(path), _) => {
            info!("📂 Loading cell summary: {}", path.display());
            let table = CellTable::load_from_file(path)?;
            let source = PrimaryCellSource::from_table(&table);
            info!(
                "📊 {} cells, {} primary",
                table.cell_count(),
                source.gene_count()
            );
            Ok(Arc::new(source))
        }
        (None, Some(groups)) => Ok(Arc::new(GroupSource::new(groups))),
        (None, None) => Err(SearchError::Config(
            "either --cells or --groups is required".into(),
        )),
    }
}

pub async fn run(args: SearchArgs, backend: &BackendConfig) -> SearchResult<()> {
    let params = match &args.config {
        Some(path) => {
            info!("⚙️  Loading search parameters from: {}", path.display());
            SearchParams::load_from_file(path)?
        }
        None => args.params.clone(),
    };

    if !args.table.exists() {
        return Err(SearchError::Config(format!(
            "input table {} does not exist",
            args.table.display()
        )));
    }

    let source = genome_source(&args)?;
    let backend = Arc::new(HttpBackend::from_config(backend));

    let build = SearchBuildParams::builder()
        .backend(backend)
        .source(source)
        .table(args.table.clone())
        .params(params);
    let mut manager = match &args.output {
        Some(path) => build.output(path.clone()).build().connect().await?,
        None => build.build().connect().await?,
    };

    info!(
        "🧬 Searching with {} solver sessions, {} parents",
        manager.cores(),
        manager.parents().len()
    );

    let summary = manager.run(args.limit_cost, args.generations).await?;

    if summary.truncated_evaluations > 0 {
        warn!(
            "⚠️  {} evaluations stopped at the cost ceiling",
            summary.truncated_evaluations
        );
    }
    if let Some(path) = &args.output {
        if summary.verified_fitness.is_some() {
            info!("💾 Output table written to {}", path.display());
        }
    }

    if args.json {
        reports::print_summary_json(&summary, manager.cache())?;
    } else {
        reports::print_search_report(&summary, manager.cache());
    }
    Ok(())
}

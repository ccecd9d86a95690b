#![deny(unused_variables)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use log::info;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use sspa::config::AnalysisConfig;
use sspa::enrich::{DifferentialTest, differential_test, gsea::gsea_with_progress};
use sspa::io::{
    LoadedAbundance, differential_frame, gsea_frame, ora_frame, read_abundance, read_id_list,
    score_frame, write_tsv,
};
use sspa::model::{FittedSspa, SspaModel};
use sspa::pathways::{PathwayDict, PathwayFormat, read_pathway_file, to_dict};
use sspa::pipeline::{AnalysisMethod, run_analysis_with_progress};
use sspa::progress::ConsoleProgress;
use sspa::method::ScoringMethod;

/// Options shared by every command that reads an abundance table and pathways.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Abundance table (CSV or TSV): sample IDs first, one column per entity
    #[arg(value_name = "DATA_PATH")]
    pub data: PathBuf,

    /// Pathway file: table with ID, Pathway_name and member columns, or GMT
    #[arg(long, value_name = "PATH")]
    pub pathways: PathBuf,

    /// Read the pathway file as GMT regardless of its extension
    #[arg(long)]
    pub gmt: bool,

    /// Column holding pathway names in tabular pathway files
    #[arg(long, value_name = "NAME")]
    pub name_column: Option<String>,

    /// Minimum number of measured entities a pathway needs to be scored
    #[arg(long, value_name = "N")]
    pub min_entity: Option<usize>,

    /// Column holding class labels; removed from the entity columns
    #[arg(long, value_name = "NAME")]
    pub labels_column: Option<String>,

    /// TOML config file; command-line flags override its values
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Seed for the stochastic engines and permutations
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output path
    #[arg(long, value_name = "PATH")]
    pub out: PathBuf,
}

#[derive(Parser)]
#[command(
    name = "sspa",
    about = "Single-sample pathway analysis for omics abundance tables",
    long_about = "Pathway-level scores per sample (z-score, PLAGE, kernel PCA, k-means, \
                 ssGSEA, GSVA), over-representation analysis and phenotype-permutation GSEA."
)]
struct Cli {
    /// Worker threads for the parallel loops (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every pathway for every sample
    #[command(about = "Single-sample pathway scores (outputs: samples x pathways TSV)")]
    Score {
        #[command(flatten)]
        common: CommonArgs,

        /// zscore, svd, kpca, cluster, cluster-proj, ssgsea or gsva
        #[arg(long)]
        method: Option<AnalysisMethod>,
    },

    /// Fit a projection model and save it as JSON
    #[command(about = "Fit a per-pathway projection model (outputs: model JSON)")]
    Fit {
        #[command(flatten)]
        common: CommonArgs,

        /// zscore, svd, kpca, cluster or cluster-proj
        #[arg(long)]
        method: Option<ScoringMethod>,
    },

    /// Score new samples with a saved model
    #[command(about = "Apply a saved projection model (outputs: samples x pathways TSV)")]
    Transform {
        #[arg(value_name = "DATA_PATH")]
        data: PathBuf,

        #[arg(long, value_name = "PATH")]
        model: PathBuf,

        #[arg(long, value_name = "NAME")]
        labels_column: Option<String>,

        #[arg(long, value_name = "PATH")]
        out: PathBuf,
    },

    /// Differential test followed by over-representation analysis
    #[command(about = "Over-representation analysis (outputs: ORA TSV)")]
    Ora {
        #[command(flatten)]
        common: CommonArgs,

        /// Adjusted p-value cutoff for differential entities
        #[arg(long)]
        cutoff: Option<f64>,

        /// ttest or mwu
        #[arg(long)]
        test: Option<DifferentialTest>,

        /// File with one background entity per line
        #[arg(long, value_name = "PATH")]
        background: Option<PathBuf>,
    },

    /// Phenotype-permutation GSEA
    #[command(about = "Two-class GSEA (outputs: GSEA TSV)")]
    Gsea {
        #[command(flatten)]
        common: CommonArgs,

        #[arg(long)]
        permutations: Option<usize>,
    },

    /// Per-entity differential test only
    #[command(about = "Two-class differential test (outputs: Entity, P-value, P-adjust)")]
    Diff {
        #[arg(value_name = "DATA_PATH")]
        data: PathBuf,

        #[arg(long, value_name = "NAME")]
        labels_column: String,

        #[arg(long)]
        test: Option<DifferentialTest>,

        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        #[arg(long, value_name = "PATH")]
        out: PathBuf,
    },

    /// Display version information
    Version,
}

fn load_config(
    path: Option<&Path>,
    min_entity: Option<usize>,
    seed: Option<u64>,
) -> Result<AnalysisConfig, Box<dyn Error>> {
    let mut config = match path {
        Some(path) => {
            info!("Loading config from '{}'", path.display());
            AnalysisConfig::load(path)?
        }
        None => AnalysisConfig::default(),
    };
    if let Some(min_entity) = min_entity {
        config.scoring.min_entity = min_entity;
        config.gsea.min_entity = min_entity;
    }
    if let Some(seed) = seed {
        config.scoring.seed = seed;
        config.gsea.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

fn load_pathways(common: &CommonArgs, config: &AnalysisConfig) -> Result<PathwayDict, Box<dyn Error>> {
    let format = if common.gmt {
        PathwayFormat::Gmt
    } else {
        PathwayFormat::from_path(&common.pathways)
    };
    let table = read_pathway_file(&common.pathways, format)?;
    let name_column = common
        .name_column
        .as_deref()
        .unwrap_or_else(|| config.name_column());
    let dict = to_dict(&table, name_column)?;
    info!(
        "{} of {} pathways have at least two distinct members",
        dict.len(),
        table.len()
    );
    Ok(dict)
}

fn require_labels(loaded: &LoadedAbundance) -> Result<&[String], Box<dyn Error>> {
    loaded
        .labels
        .as_deref()
        .ok_or_else(|| "--labels-column is required for two-class analyses".into())
}

fn run_score(common: CommonArgs, method: Option<AnalysisMethod>) -> Result<(), Box<dyn Error>> {
    let mut config = load_config(common.config.as_deref(), common.min_entity, common.seed)?;
    if let Some(method) = method {
        config.method = method;
    }
    let pathways = load_pathways(&common, &config)?;
    let loaded = read_abundance(&common.data, common.labels_column.as_deref())?;
    let progress = ConsoleProgress::new();
    let scores = run_analysis_with_progress(
        &loaded.matrix,
        &pathways,
        config.method,
        &config.scoring,
        &config.rank,
        &progress,
    )?;
    write_tsv(&common.out, &mut score_frame(&scores)?)?;
    Ok(())
}

fn run_fit(common: CommonArgs, method: Option<ScoringMethod>) -> Result<(), Box<dyn Error>> {
    let config = load_config(common.config.as_deref(), common.min_entity, common.seed)?;
    let method = match (method, config.method) {
        (Some(method), _) => method,
        (None, AnalysisMethod::Projection(method)) => method,
        (None, AnalysisMethod::Rank(rank)) => {
            return Err(format!("{rank} has no fitted state; use the score command").into());
        }
    };
    let pathways = load_pathways(&common, &config)?;
    let loaded = read_abundance(&common.data, common.labels_column.as_deref())?;
    let fitted = SspaModel::with_options(method, config.scoring.clone()).fit_with_progress(
        &loaded.matrix,
        &pathways,
        &ConsoleProgress::new(),
    )?;
    fitted.save(&common.out)?;
    info!(
        "Saved {} model for {} pathways to '{}'",
        fitted.method(),
        fitted.n_pathways(),
        common.out.display()
    );
    Ok(())
}

fn run_transform(
    data: &Path,
    model: &Path,
    labels_column: Option<&str>,
    out: &Path,
) -> Result<(), Box<dyn Error>> {
    let fitted = FittedSspa::load(model)?;
    info!(
        "Loaded {} model with {} pathways from '{}'",
        fitted.method(),
        fitted.n_pathways(),
        model.display()
    );
    let loaded = read_abundance(data, labels_column)?;
    let scores = fitted.transform_with_progress(&loaded.matrix, &ConsoleProgress::new())?;
    write_tsv(out, &mut score_frame(&scores)?)?;
    Ok(())
}

fn run_ora(
    common: CommonArgs,
    cutoff: Option<f64>,
    test: Option<DifferentialTest>,
    background: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let mut config = load_config(common.config.as_deref(), common.min_entity, common.seed)?;
    if let Some(cutoff) = cutoff {
        config.ora.cutoff = cutoff;
    }
    if let Some(test) = test {
        config.ora.test = test;
    }
    if let Some(path) = background {
        config.ora.background = Some(read_id_list(&path)?);
    }
    let pathways = load_pathways(&common, &config)?;
    let loaded = read_abundance(&common.data, common.labels_column.as_deref())?;
    let records = config.ora.run(&loaded.matrix, require_labels(&loaded)?, &pathways)?;
    write_tsv(&common.out, &mut ora_frame(&records)?)?;
    Ok(())
}

fn run_gsea(common: CommonArgs, permutations: Option<usize>) -> Result<(), Box<dyn Error>> {
    let mut config = load_config(common.config.as_deref(), common.min_entity, common.seed)?;
    if let Some(permutations) = permutations {
        config.gsea.permutations = permutations;
    }
    let pathways = load_pathways(&common, &config)?;
    let loaded = read_abundance(&common.data, common.labels_column.as_deref())?;
    let records = gsea_with_progress(
        &loaded.matrix,
        require_labels(&loaded)?,
        &pathways,
        &config.gsea,
        &ConsoleProgress::new(),
    )?;
    write_tsv(&common.out, &mut gsea_frame(&records)?)?;
    Ok(())
}

fn run_diff(
    data: &Path,
    labels_column: &str,
    test: Option<DifferentialTest>,
    config: Option<&Path>,
    out: &Path,
) -> Result<(), Box<dyn Error>> {
    let config = load_config(config, None, None)?;
    let test = test.unwrap_or(config.ora.test);
    let loaded = read_abundance(data, Some(labels_column))?;
    let records = differential_test(&loaded.matrix, require_labels(&loaded)?, test)?;
    write_tsv(out, &mut differential_frame(&records)?)?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let Cli { threads, command } = cli;

    if let Some(threads) = threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            eprintln!("Error: {e}");
            process::exit(1);
        }
        info!("Using {threads} threads for parallel operations.");
    }

    let result = match command {
        Some(Commands::Score { common, method }) => run_score(common, method),
        Some(Commands::Fit { common, method }) => run_fit(common, method),
        Some(Commands::Transform {
            data,
            model,
            labels_column,
            out,
        }) => run_transform(&data, &model, labels_column.as_deref(), &out),
        Some(Commands::Ora {
            common,
            cutoff,
            test,
            background,
        }) => run_ora(common, cutoff, test, background),
        Some(Commands::Gsea {
            common,
            permutations,
        }) => run_gsea(common, permutations),
        Some(Commands::Diff {
            data,
            labels_column,
            test,
            config,
            out,
        }) => run_diff(&data, &labels_column, test, config.as_deref(), &out),
        Some(Commands::Version) => {
            println!("sspa {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            if let Err(e) = Cli::command().print_help() {
                eprintln!("Error: {e}");
                process::exit(1);
            }
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

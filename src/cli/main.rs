use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand, ValueEnum};
use docsearch::{
    config::Config,
    context::CallContext,
    metrics,
    search::{
        create_provider, Collection, Document, Link, Project, SearchBackend, SearchProvider,
        SearchQuery, SearchRecord, SortOrder,
    },
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "docsearch-cli")]
#[command(about = "Document search backend CLI", long_about = None)]
struct Cli {
    /// Configuration file (overrides DOCSEARCH_CONFIG)
    #[arg(short, long, env = "DOCSEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Backend to use instead of the configured one
    #[arg(short, long)]
    backend: Option<SearchBackend>,

    /// Per-command deadline in seconds
    #[arg(short, long, default_value = "30")]
    timeout: u64,

    /// Print the metrics recorded by the command to stderr afterwards
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Docs,
    Drafts,
    Projects,
    Links,
}

#[derive(Subcommand)]
enum Commands {
    /// Check backend health
    Health,

    /// Search a collection
    Search {
        #[arg(value_name = "QUERY", default_value = "")]
        query: String,

        #[arg(short = 'C', long, value_enum, default_value = "docs")]
        collection: Target,

        /// Filter as field=value, repeatable
        #[arg(short, long = "filter", value_name = "FIELD=VALUE")]
        filters: Vec<String>,

        #[arg(short, long, default_value = "0")]
        page: usize,

        #[arg(short = 's', long, default_value = "20")]
        per_page: usize,

        /// Facets to count, comma separated
        #[arg(short = 'F', long, value_delimiter = ',')]
        facets: Vec<String>,

        /// Sort as field or field:desc
        #[arg(long)]
        sort: Option<String>,
    },

    /// Fetch a record by objectID
    Get {
        #[arg(value_name = "OBJECT_ID")]
        id: String,

        #[arg(short = 'C', long, value_enum, default_value = "docs")]
        collection: Target,
    },

    /// Index records from a JSON file holding one object or an array
    Index {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short = 'C', long, value_enum, default_value = "docs")]
        collection: Target,
    },

    /// Delete records by objectID
    Delete {
        #[arg(value_name = "OBJECT_ID", required = true)]
        ids: Vec<String>,

        #[arg(short = 'C', long, value_enum, default_value = "docs")]
        collection: Target,
    },

    /// Remove every record from a collection
    Clear {
        #[arg(short = 'C', long, value_enum, default_value = "docs")]
        collection: Target,
    },

    /// Facet counts across a whole document collection
    Facets {
        /// Facet names, comma separated; all known facets when empty
        #[arg(value_delimiter = ',')]
        names: Vec<String>,

        #[arg(long)]
        drafts: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        std::env::set_var("DOCSEARCH_CONFIG", path);
    }
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(backend) = cli.backend {
        config.search.backend = backend;
    }

    init_tracing(&config.logging.level, config.logging.json);
    if let Err(e) = metrics::init_metrics() {
        tracing::warn!("Failed to initialize metrics: {}", e);
    }

    let ctx = CallContext::with_timeout(Duration::from_secs(cli.timeout));
    let provider = create_provider(&ctx, &config.search).await?;
    tracing::debug!(backend = provider.name(), "Search provider ready");

    let result = run(cli.command, provider.as_ref(), &ctx).await;
    if cli.metrics {
        eprint!("{}", metrics::gather_metrics());
    }
    result
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("docsearch={level}").into());
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so command output stays pipeable.
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(
    command: Commands,
    provider: &dyn SearchProvider,
    ctx: &CallContext,
) -> anyhow::Result<()> {
    match command {
        Commands::Health => {
            provider.healthy(ctx).await?;
            print_json(&serde_json::json!({
                "backend": provider.name(),
                "status": "healthy",
            }))?;
        }

        Commands::Search {
            query,
            collection,
            filters,
            page,
            per_page,
            facets,
            sort,
        } => {
            let query = build_query(query, &filters, page, per_page, facets, sort.as_deref())?;
            match collection {
                Target::Docs => search::<Document, _>(provider.documents(), ctx, &query).await?,
                Target::Drafts => search::<Document, _>(provider.drafts(), ctx, &query).await?,
                Target::Projects => search::<Project, _>(provider.projects(), ctx, &query).await?,
                Target::Links => bail!("links do not support search"),
            }
        }

        Commands::Get { id, collection } => match collection {
            Target::Docs => print_json(&provider.documents().get_object(ctx, &id).await?)?,
            Target::Drafts => print_json(&provider.drafts().get_object(ctx, &id).await?)?,
            Target::Projects => print_json(&provider.projects().get_object(ctx, &id).await?)?,
            Target::Links => print_json(&provider.links().get_link(ctx, &id).await?)?,
        },

        Commands::Index { file, collection } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let count = match collection {
                Target::Docs => index::<Document, _>(provider.documents(), ctx, &raw).await?,
                Target::Drafts => index::<Document, _>(provider.drafts(), ctx, &raw).await?,
                Target::Projects => index::<Project, _>(provider.projects(), ctx, &raw).await?,
                Target::Links => {
                    let links: Vec<Link> = parse_records(&raw)?;
                    for link in &links {
                        provider.links().save_link(ctx, link).await?;
                    }
                    links.len()
                }
            };
            print_json(&serde_json::json!({ "indexed": count }))?;
        }

        Commands::Delete { ids, collection } => {
            match collection {
                Target::Docs => delete::<Document, _>(provider.documents(), ctx, &ids).await?,
                Target::Drafts => delete::<Document, _>(provider.drafts(), ctx, &ids).await?,
                Target::Projects => delete::<Project, _>(provider.projects(), ctx, &ids).await?,
                Target::Links => {
                    for id in &ids {
                        provider.links().delete_link(ctx, id).await?;
                    }
                }
            }
            print_json(&serde_json::json!({ "deleted": ids.len() }))?;
        }

        Commands::Clear { collection } => {
            match collection {
                Target::Docs => provider.documents().clear(ctx).await?,
                Target::Drafts => provider.drafts().clear(ctx).await?,
                Target::Projects => provider.projects().clear(ctx).await?,
                Target::Links => provider.links().clear(ctx).await?,
            }
            print_json(&serde_json::json!({ "cleared": true }))?;
        }

        Commands::Facets { names, drafts } => {
            let collection = if drafts {
                provider.drafts()
            } else {
                provider.documents()
            };
            print_json(&collection.get_facets(ctx, &names).await?)?;
        }
    }

    Ok(())
}

fn build_query(
    query: String,
    filters: &[String],
    page: usize,
    per_page: usize,
    facets: Vec<String>,
    sort: Option<&str>,
) -> anyhow::Result<SearchQuery> {
    let mut search = SearchQuery::new(query)
        .with_page(page, per_page)
        .with_facets(facets);

    for filter in filters {
        let Some((field, value)) = filter.split_once('=') else {
            bail!("filter '{}' must look like field=value", filter);
        };
        search = search.with_filter(field, vec![value]);
    }

    if let Some(sort) = sort {
        search = match sort.split_once(':') {
            Some((field, order)) => {
                let order: SortOrder = order
                    .parse()
                    .with_context(|| format!("unknown sort order '{}'", order))?;
                search.with_sort(field, order)
            }
            None => search.with_sort(sort, SortOrder::Asc),
        };
    }

    Ok(search)
}

async fn search<R, C>(collection: &C, ctx: &CallContext, query: &SearchQuery) -> anyhow::Result<()>
where
    R: SearchRecord,
    C: Collection<R> + ?Sized,
{
    print_json(&collection.search(ctx, query).await?)
}

async fn index<R, C>(collection: &C, ctx: &CallContext, raw: &str) -> anyhow::Result<usize>
where
    R: SearchRecord,
    C: Collection<R> + ?Sized,
{
    let records: Vec<R> = parse_records(raw)?;
    match records.as_slice() {
        [] => {}
        [single] => collection.index(ctx, single).await?,
        many => collection.index_batch(ctx, many).await?,
    }
    Ok(records.len())
}

async fn delete<R, C>(collection: &C, ctx: &CallContext, ids: &[String]) -> anyhow::Result<()>
where
    R: SearchRecord,
    C: Collection<R> + ?Sized,
{
    match ids {
        [single] => collection.delete(ctx, single).await?,
        many => collection.delete_batch(ctx, many).await?,
    }
    Ok(())
}

/// Accept either a single JSON object or an array of them.
fn parse_records<R: serde::de::DeserializeOwned>(raw: &str) -> anyhow::Result<Vec<R>> {
    let value: serde_json::Value = serde_json::from_str(raw).context("Invalid JSON")?;
    let records = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<R>, _>>()?,
        single => vec![serde_json::from_value(single)?],
    };
    Ok(records)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

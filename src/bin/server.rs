use anyhow::{bail, Context};
use schemagate::catalog::RelationalGraph;
use schemagate::executor::PageConfig;
use schemagate::naming::Naming;
use schemagate::server::{Server, ServerConfig};
use schemagate::storage::SqliteStore;
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: schemagate-server --db <path> [--host <addr>] [--port|-p <port>] \
[--read-only] [--per-page <n>] [--max-per-page <n>]";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1);
    let mut config = ServerConfig::new();
    let mut page = PageConfig::new();
    let mut db: Option<String> = None;

    // Simple argument parsing
    while let Some(flag) = args.next() {
        let mut value = || {
            args.next()
                .with_context(|| format!("missing value for {}\n{}", flag, USAGE))
        };
        match flag.as_str() {
            "--db" => db = Some(value()?),
            "--host" => config = config.host(value()?),
            "--port" | "-p" => config = config.port(value()?.parse().context("invalid --port")?),
            "--per-page" => {
                page = page.default_per_page(value()?.parse().context("invalid --per-page")?)
            }
            "--max-per-page" => {
                page = page.max_per_page(value()?.parse().context("invalid --max-per-page")?)
            }
            "--read-only" => config = config.read_only(true),
            "--help" | "-h" => {
                println!("{}", USAGE);
                return Ok(());
            }
            other => bail!("unknown argument '{}'\n{}", other, USAGE),
        }
    }

    let db = db.with_context(|| format!("--db is required\n{}", USAGE))?;
    let store = SqliteStore::open(&db).with_context(|| format!("opening {}", db))?;
    let graph = RelationalGraph::introspect(&store).context("introspecting schema")?;

    let server = Server::new(
        config.page(page),
        Arc::new(graph),
        Arc::new(store),
        Naming::new(),
    )?;
    server.start()?;
    Ok(())
}

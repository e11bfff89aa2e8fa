//! `maint`: list, inspect and run maintenance scenarios
//!
//! System state comes from a TOML snapshot; every effect goes through a
//! dry-run host that logs what it would do.

mod operator;

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use maint_core::{
    check_applicability, compose, Applicability, EngineConfig, LogConfig, Runner, ScenarioCatalog,
    SessionContext, StaticFeatureRegistry, StepRegistry, SystemSnapshot, SystemState, Tag,
};
use maint_upgrade::{
    default_registry, upgrade_catalog, DryRunHost, HostActions, UpgradeOrchestrator,
};
use operator::TerminalOperator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn build_cli() -> Command {
    let json = Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output as JSON");
    let assume_yes = Arg::new("assume-yes")
        .long("assume-yes")
        .short('y')
        .action(ArgAction::SetTrue)
        .help("Answer yes to every confirmation");

    Command::new("maint")
        .version(maint_core::VERSION)
        .about("Maintenance scenario runner")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Engine configuration file (TOML)"),
        )
        .arg(
            Arg::new("snapshot")
                .long("snapshot")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("System snapshot file (TOML), overrides the configured one"),
        )
        .subcommand(
            Command::new("list")
                .about("List scenarios and whether they apply")
                .arg(
                    Arg::new("tag")
                        .long("tag")
                        .help("Only scenarios carrying this tag"),
                )
                .arg(json.clone()),
        )
        .subcommand(
            Command::new("plan")
                .about("Show the composed steps of a scenario without running it")
                .arg(Arg::new("label").required(true).help("Scenario label")),
        )
        .subcommand(
            Command::new("run")
                .about("Run one scenario")
                .arg(Arg::new("label").required(true).help("Scenario label"))
                .arg(json.clone())
                .arg(assume_yes.clone()),
        )
        .subcommand(
            Command::new("upgrade")
                .about("Run every upgrade phase in order")
                .arg(json)
                .arg(assume_yes),
        )
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let json = log.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text = (!log.json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
}

/// Everything a command needs, loaded from config and snapshot
struct Environment {
    features: StaticFeatureRegistry,
    session: SessionContext,
    host: Arc<dyn HostActions>,
    registry: StepRegistry,
    catalog: ScenarioCatalog,
}

impl Environment {
    fn load(matches: &ArgMatches) -> anyhow::Result<(EngineConfig, Self)> {
        let mut config = match matches.get_one::<PathBuf>("config") {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("loading configuration {}", path.display()))?,
            None => EngineConfig::new(),
        };
        if let Some(path) = matches.get_one::<PathBuf>("snapshot") {
            config = config.with_snapshot(path);
        }
        if let Some((_, sub)) = matches.subcommand() {
            if sub.try_get_one::<bool>("assume-yes").ok().flatten() == Some(&true) {
                config = config.with_assume_yes(true);
            }
        }

        let snapshot = match &config.snapshot {
            Some(path) => SystemSnapshot::load(path)
                .with_context(|| format!("loading snapshot {}", path.display()))?,
            None => SystemSnapshot::default(),
        };
        let features = snapshot.feature_registry()?;
        let session = snapshot.session(&config);

        let host: Arc<dyn HostActions> = Arc::new(DryRunHost::new());
        let registry = default_registry(&host)?;
        let catalog = upgrade_catalog(&host)?;

        Ok((
            config,
            Self {
                features,
                session,
                host,
                registry,
                catalog,
            },
        ))
    }

    fn state(&self) -> SystemState<'_> {
        SystemState::new(&self.features, &self.session)
    }

    fn watch_interrupt(&self) {
        let cancel = self.session.cancel_handle().clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current step");
                cancel.cancel();
            }
        });
    }
}

fn list(env: &Environment, args: &ArgMatches) -> anyhow::Result<i32> {
    let tag = args
        .get_one::<String>("tag")
        .map(|t| Tag::new(t.as_str()))
        .transpose()?;
    let state = env.state();

    let selected: Vec<_> = env
        .catalog
        .describe()
        .into_iter()
        .zip(env.catalog.iter())
        .filter(|(_, scenario)| tag.as_ref().map_or(true, |t| scenario.metadata().has_tag(t)))
        .map(|(description, scenario)| {
            let applicable =
                check_applicability(scenario.metadata().confinement(), &state).is_applicable();
            (description, applicable)
        })
        .collect();

    if args.get_flag("json") {
        let rows: Vec<serde_json::Value> = selected
            .iter()
            .map(|(description, applicable)| {
                serde_json::json!({ "scenario": description, "applicable": applicable })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for (description, applicable) in &selected {
            println!(
                "{:<22} {:<9} {:<15} {}",
                description.label,
                description.strategy.to_string(),
                if *applicable { "applicable" } else { "not applicable" },
                description.description
            );
            println!("{:<22} tags: {}", "", description.tags.join(", "));
        }
    }
    Ok(0)
}

fn plan(env: &Environment, args: &ArgMatches) -> anyhow::Result<i32> {
    let label = args
        .get_one::<String>("label")
        .context("missing scenario label")?;
    let scenario = env.catalog.get(label)?;
    let state = env.state();

    let plan = compose(scenario.as_ref(), &env.registry)?;
    print!("{plan}");
    if let Some(confinement) = scenario.metadata().confinement() {
        println!("Confinement: {confinement}");
    }
    match check_applicability(scenario.metadata().confinement(), &state) {
        Applicability::Applicable => println!("Applicable: yes"),
        Applicability::NotApplicable { reason } => println!("Applicable: no ({reason})"),
    }
    Ok(0)
}

async fn run(env: &Environment, args: &ArgMatches) -> anyhow::Result<i32> {
    let label = args
        .get_one::<String>("label")
        .context("missing scenario label")?;
    let scenario = env.catalog.get(label)?;

    env.watch_interrupt();
    let result = Runner::new(Arc::new(TerminalOperator))
        .run(scenario.as_ref(), &env.registry, env.state())
        .await?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.render_text());
    }
    Ok(result.status.exit_code())
}

async fn upgrade(mut env: Environment, args: &ArgMatches) -> anyhow::Result<i32> {
    env.watch_interrupt();
    let orchestrator = UpgradeOrchestrator::new(
        &env.host,
        std::mem::take(&mut env.registry),
        Runner::new(Arc::new(TerminalOperator)),
    )?;
    let report = orchestrator.run(&env.features, &mut env.session).await;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(report.exit_code())
}

async fn dispatch(matches: ArgMatches) -> anyhow::Result<i32> {
    let (config, env) = Environment::load(&matches)?;
    init_tracing(&config.log);
    tracing::debug!(?config, "configuration loaded");

    match matches.subcommand() {
        Some(("list", args)) => list(&env, args),
        Some(("plan", args)) => plan(&env, args),
        Some(("run", args)) => run(&env, args).await,
        Some(("upgrade", args)) => upgrade(env, args).await,
        Some((other, _)) => anyhow::bail!("unknown command `{other}`"),
        None => anyhow::bail!("no command given"),
    }
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();
    let code = match dispatch(matches).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            1
        }
    };
    std::process::exit(code);
}

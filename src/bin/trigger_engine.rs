use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use trigger_engine::{
    config::EngineConfig,
    engine::ExpressionEngine,
    eval::EvaluationContext,
    event::{log::LogBusError, EventDispatcher, LogBus, Priority},
    trigger::{CompositeTrigger, Condition, Trigger},
    types::{Mode, Value},
    Error, InternalResult,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable debug mode
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate an expression and print its value and dependencies
    Eval(ExprArgs),

    /// Evaluate an expression as a trigger condition
    Check(ExprArgs),

    /// Run a short dispatch loop with the worker pool
    Demo(DemoArgs),
}

#[derive(Args)]
struct ExprArgs {
    /// Expression source
    expression: String,

    /// Variable binding, repeatable (name=value)
    #[arg(long = "var", value_parser = parse_binding)]
    vars: Vec<(String, Value)>,

    /// Use LOOSE coercion
    #[arg(long)]
    loose: bool,
}

impl ExprArgs {
    fn context(&self) -> EvaluationContext {
        let mode = if self.loose { Mode::Loose } else { Mode::Strict };
        EvaluationContext::with_variables(mode, self.vars.iter().cloned())
    }
}

#[derive(Args)]
struct DemoArgs {
    /// Number of dispatch cycles
    #[arg(short, long, default_value = "20")]
    ticks: u32,
}

fn parse_binding(s: &str) -> Result<(String, Value), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{}`", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in `{}`", s));
    }
    Ok((name.to_string(), Value::parse_literal(value)))
}

fn load_config(path: &Path) -> InternalResult<EngineConfig> {
    if path.exists() {
        EngineConfig::from_file(path)
    } else {
        debug!("{} not found, using defaults", path.display());
        Ok(EngineConfig::default())
    }
}

fn eval(args: &ExprArgs, config: &EngineConfig) -> InternalResult<()> {
    let engine = ExpressionEngine::from_config(config);
    let node = engine.parse(&args.expression)?;
    let mut context = args.context();
    let value = engine.try_evaluate(&node, &mut context)?;

    println!("value: {}", value);
    let dependencies: Vec<String> = context
        .dependency_snapshot()
        .into_iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect();
    println!("dependencies: [{}]", dependencies.join(", "));
    println!("mode: {}", context.mode());
    Ok(())
}

fn check(args: &ExprArgs, config: &EngineConfig) -> InternalResult<()> {
    let engine = Arc::new(ExpressionEngine::from_config(config));
    engine.parse(&args.expression)?;
    let condition = Condition::new(engine, &args.expression);
    let mut context = args.context();
    let result = condition.try_evaluate(&mut context, "cli")?;
    println!("{}", result);
    Ok(())
}

async fn demo(args: &DemoArgs, config: &EngineConfig) -> InternalResult<()> {
    let engine = Arc::new(ExpressionEngine::from_config(config));
    let bus = LogBus::new(config.log_bus_capacity);
    let mut records = bus.subscribe();

    let printer = tokio::spawn(async move {
        loop {
            match records.recv().await {
                Ok(record) if record.success => println!(
                    "[{}] #{} {} fired ({} ns)",
                    record.level, record.seq, record.trigger, record.elapsed_nanos
                ),
                Ok(record) => debug!("#{} {} skipped", record.seq, record.trigger),
                Err(LogBusError::Lagged { count }) => warn!("log printer lagged by {}", count),
                Err(_) => break,
            }
        }
    });

    let mut dispatcher = EventDispatcher::from_config(config, Arc::new(bus))?;
    let landed = Arc::new(AtomicUsize::new(0));

    let counter = landed.clone();
    dispatcher.register(
        Trigger::expression(
            "falling",
            Condition::new(engine.clone(), "time > 1000 && state === 'falling'"),
        )
        .with_action(move |snapshot| {
            counter.fetch_add(1, Ordering::SeqCst);
            info!("falling at time {}", snapshot.get("time").cloned().unwrap_or_default());
            Ok(())
        }),
    );
    dispatcher.register(Trigger::composite(
        "restless",
        CompositeTrigger::any([
            Condition::new(engine.clone(), "boredom >= 3"),
            Condition::new(engine.clone(), "state === 'idle' && time % 500 == 0"),
        ]),
    ));

    let mut interval = tokio::time::interval(config.poll_interval);
    for tick in 0..args.ticks {
        interval.tick().await;
        let time = i64::from(tick) * 250;
        dispatcher.set_variable("time", time);
        dispatcher.set_variable("state", if tick % 8 < 4 { "idle" } else { "falling" });
        dispatcher.set_variable("boredom", i64::from(tick % 5));
        let fired = dispatcher.poll_and_dispatch();
        debug!("tick {} fired {}", tick, fired);
    }

    dispatcher.dispatch(
        || {
            info!("demo finished");
            Ok(())
        },
        Priority::Low,
    );
    dispatcher.shutdown_workers();
    if !dispatcher.await_workers(config.shutdown_timeout) {
        warn!("workers did not stop within {:?}", config.shutdown_timeout);
    }
    drop(dispatcher);
    printer
        .await
        .map_err(|e| Error::Internal(format!("log printer failed: {}", e)))?;

    let stats = engine.cache_stats();
    println!(
        "falling actions: {}, cache hits: {}, misses: {}, hit rate: {:.2}",
        landed.load(Ordering::SeqCst),
        stats.hits,
        stats.misses,
        stats.hit_rate
    );
    Ok(())
}

async fn run(cli: &Cli) -> InternalResult<()> {
    let config = load_config(&cli.config)?;
    match &cli.command {
        Commands::Eval(args) => eval(args, &config),
        Commands::Check(args) => check(args, &config),
        Commands::Demo(args) => demo(args, &config).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer())
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

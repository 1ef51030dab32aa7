use anyhow::Context;
use lewansoul_guard::{
    GuardedBusClient, LewansoulDriver, LimitTable, ServoLimit, Session, SessionConfig,
    DEFAULT_BAUD_RATE,
};
use structopt::StructOpt;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(StructOpt, Debug)]
#[structopt(name = "servo-repl", about = "Move LewanSoul bus servos within safe limits")]
struct Args {
    /// Serial port to use
    #[structopt(default_value = "/dev/ttyUSB0")]
    port: String,

    #[structopt(long, default_value = "115200")]
    baud_rate: u32,

    /// Position limit as ID:MIN:MAX. Replaces the built-in table, repeat for more servos
    #[structopt(long = "limit", number_of_values = 1)]
    limits: Vec<ServoLimit>,

    /// Servo selected at startup
    #[structopt(long, default_value = "4")]
    servo: u8,

    /// Power off the selected servo on exit
    #[structopt(long)]
    unload_on_exit: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lewansoul_guard=info,servo_repl=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::from_args();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(args));
    // stdin is read on a blocking thread that may still wait for a line
    runtime.shutdown_background();
    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    let limits: LimitTable = if args.limits.is_empty() {
        LimitTable::factory()
    } else {
        args.limits.into_iter().collect()
    };
    for limit in limits.iter() {
        info!("servo {} limited to {}", limit.servo_id(), limit);
    }

    if args.baud_rate != DEFAULT_BAUD_RATE {
        warn!("using non standard baud rate {}", args.baud_rate);
    }
    let driver = LewansoulDriver::with_baud_rate(&args.port, args.baud_rate)
        .with_context(|| format!("failed to open serial port {}", args.port))?;
    info!("connected to {}", args.port);

    let client = GuardedBusClient::new(driver, limits);
    let mut session = Session::new(
        client,
        SessionConfig {
            initial_servo_id: args.servo,
            unload_on_exit: args.unload_on_exit,
        },
    );

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("unable to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };
    session
        .run(tokio::io::stdin(), &mut std::io::stdout(), shutdown)
        .await?;
    Ok(())
}

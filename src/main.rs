use ambulance_sim::generation::{ollama, synthea};
use ambulance_sim::runtime::DEFAULT_ADDR;
use ambulance_sim::simulation::{RampPolicy, SimConfig, SimWorld};
use clap::Parser;
use log::info;

#[derive(Parser)]
#[command(name = "ambulance_sim")]
#[command(about = "Ambulance dispatch simulation with a web UI")]
struct Cli {
    /// Run without the web UI, using local patient generation
    #[arg(long)]
    headless: bool,

    /// Number of simulation ticks to run in headless mode
    #[arg(long, default_value = "1000")]
    ticks: u32,

    /// Time delta per tick in seconds
    #[arg(long, default_value = "0.1")]
    delta: f32,

    /// Seed for reproducible worlds
    #[arg(long)]
    seed: Option<u64>,

    /// Redirect to another hospital once when the waiting room is full
    #[arg(long)]
    redirect: bool,

    /// Ollama model used for conditions and encounters
    #[arg(long, default_value = ollama::DEFAULT_MODEL)]
    llm_model: String,

    /// Use local catalogs instead of the LLM
    #[arg(long)]
    no_llm: bool,

    #[arg(long, default_value = ollama::DEFAULT_OLLAMA_URL)]
    ollama_url: String,

    #[arg(long, default_value = synthea::DEFAULT_SYNTHEA_URL)]
    synthea_url: String,

    /// Use local identities instead of Synthea
    #[arg(long)]
    no_synthea: bool,

    /// Write generated FHIR resources under fhir_export/
    #[arg(long)]
    export_fhir: bool,

    /// Address for the web UI
    #[arg(long, default_value = DEFAULT_ADDR)]
    addr: std::net::SocketAddr,
}

impl Cli {
    fn sim_config(&self) -> SimConfig {
        SimConfig {
            ramp_policy: if self.redirect {
                RampPolicy::Redirect
            } else {
                RampPolicy::Ramp
            },
            ..SimConfig::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,ambulance_sim=info"),
    )
    .init();

    let cli = Cli::parse();

    if cli.headless {
        run_headless(&cli);
        return Ok(());
    }

    #[cfg(feature = "ui")]
    return run_with_ui(cli);

    #[cfg(not(feature = "ui"))]
    {
        eprintln!("Error: UI feature is not enabled. Rebuild with --features ui or pass --headless");
        std::process::exit(1);
    }
}

/// Run the simulation in headless mode (no web server, no providers)
fn run_headless(cli: &Cli) {
    let (ticks, delta) = (cli.ticks, cli.delta.max(0.001));
    println!("Running ambulance simulation in headless mode...");
    println!("Ticks: {}, Delta: {}s", ticks, delta);

    // Calculate how many ticks equal 1 second of simulation time
    let ticks_per_second = (1.0 / delta).ceil() as u32;
    println!("Running {} ticks per second (simulated time)", ticks_per_second);
    println!();

    let mut world = match cli.seed {
        Some(seed) => SimWorld::from_config_with_seed(cli.sim_config(), seed),
        None => SimWorld::from_config(cli.sim_config()),
    };
    world.auto_generate = true;

    println!("Initial state:");
    world.print_summary();
    world.draw_map();
    println!();

    let mut tick = 0;
    while tick < ticks {
        let ticks_to_run = ticks_per_second.min(ticks - tick);

        for _ in 0..ticks_to_run {
            tick += 1;
            world.tick(delta);
        }

        println!("--- After tick {} ({:.1}s simulated time) ---", tick, tick as f32 * delta);
        world.print_summary();
        world.draw_map();
        println!();
    }

    println!("=== Final State ===");
    world.print_summary();
    world.draw_map();

    let stats = &world.stats;
    let success_rate = if stats.patients_generated == 0 {
        0.0
    } else {
        stats.patients_discharged as f32 / stats.patients_generated as f32 * 100.0
    };
    info!("=== SIMULATION COMPLETE ===");
    info!(
        "Patients generated: {}, Patients discharged: {}, Success rate: {:.1}%",
        stats.patients_generated, stats.patients_discharged, success_rate
    );
    info!(
        "Pickups: {}, drop-offs: {}, ramp events: {}, redirects: {}",
        stats.pickups, stats.dropoffs, stats.ramp_events, stats.redirects
    );
}

#[cfg(feature = "ui")]
fn run_with_ui(cli: Cli) -> anyhow::Result<()> {
    use ambulance_sim::runtime::{RuntimeOptions, Simulation};
    use std::path::PathBuf;

    let options = RuntimeOptions {
        config: cli.sim_config(),
        llm_model: cli.llm_model.clone(),
        ollama_url: cli.ollama_url.clone(),
        synthea_url: cli.synthea_url.clone(),
        use_llm: !cli.no_llm,
        use_synthea: !cli.no_synthea,
        export_dir: cli
            .export_fhir
            .then(|| PathBuf::from(ambulance_sim::export::DEFAULT_EXPORT_ROOT)),
        seed: cli.seed,
        ..RuntimeOptions::default()
    };

    println!("Starting Ambulance Sim UI on http://{} ...", cli.addr);
    println!("  LLM: {}", if options.use_llm { options.llm_model.as_str() } else { "off" });
    println!("  Synthea: {}", if options.use_synthea { options.synthea_url.as_str() } else { "off" });
    println!();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let simulation = Simulation::new(&options)?;
        simulation.start();
        ambulance_sim::ui::serve(simulation, cli.addr).await
    })
}

use clap::{Parser, Subcommand};
use multiworld_common::Transform;
use multiworld_kernel::{EntityData, WorldType};
use multiworld_universe::{Placement, Universe, messages};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "multiworld-cli", about = "Manage the worlds of a multiworld universe")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Universe root directory
    #[arg(short, long, default_value = "universe")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and universe settings
    Info,
    /// List loaded worlds
    List,
    /// Create a new world
    Add {
        name: String,
        /// normal, flat, void or dummy
        #[arg(short = 't', long = "type", default_value = "normal")]
        world_type: String,
    },
    /// Unload a world
    Remove {
        name: String,
        /// Also delete the world directory
        #[arg(long)]
        destroy: bool,
    },
    /// Copy a world to a new world with a fresh identity
    Clone { source: String, name: String },
    /// Make a world the default
    Default { name: String },
    /// Turn protection on or off for a world
    Protect {
        name: String,
        #[arg(long)]
        off: bool,
    },
    /// Spawn a player in one world and teleport it to another
    Tp {
        target: String,
        /// World the player starts in (defaults to the default world)
        #[arg(long)]
        from: Option<String>,
        /// Exact destination; surface at the origin when omitted
        #[arg(num_args = 3, value_names = ["X", "Y", "Z"], allow_negative_numbers = true)]
        position: Option<Vec<f32>>,
    },
    /// Spawn a player at a position and make it the world's spawn point
    Spawn {
        world: String,
        #[arg(num_args = 3, value_names = ["X", "Y", "Z"], allow_negative_numbers = true)]
        position: Vec<f32>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let universe = Universe::open(&cli.root)?;

    match cli.command {
        Commands::Info => {
            let config = universe.config();
            println!("multiworld-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("root: {}", universe.root().display());
            println!("default world: {}", config.default_world);
            println!(
                "world types: {}",
                WorldType::ALL.map(WorldType::as_str).join(", ")
            );
            println!("loaded worlds: {}", universe.registry().len());
        }
        Commands::List => {
            for line in messages::list(&universe.list()) {
                println!("{line}");
            }
        }
        Commands::Add { name, world_type } => {
            match universe.create_by_name(&name, &world_type).wait()? {
                Ok(world) => println!("{}", messages::world_created(world.name(), &world_type)),
                Err(err) => println!("{}", messages::error(&err)),
            }
        }
        Commands::Remove { name, destroy } => match universe.destroy(&name, destroy) {
            Some(outcome) => println!("{}", messages::destroy(outcome, &name)),
            None => println!("{}", messages::world_not_found(&name)),
        },
        Commands::Clone { source, name } => {
            println!("{}", messages::clone_started(&source, &name));
            match universe.clone_world(&source, &name) {
                Ok(world) => println!("{}", messages::clone_succeeded(world.name())),
                Err(err) => println!("{}", messages::clone_failed(&err)),
            }
        }
        Commands::Default { name } => match universe.set_default(&name) {
            Ok(()) => println!("{}", messages::default_changed(&name)),
            Err(err) => println!("{}", messages::error(&err)),
        },
        Commands::Protect { name, off } => match universe.set_protection(&name, !off).wait()? {
            Ok(()) => println!("{}", messages::protection(&name, !off)),
            Err(err) => println!("{}", messages::error(&err)),
        },
        Commands::Tp {
            target,
            from,
            position,
        } => {
            let from = from.unwrap_or_else(|| universe.default_world());
            let Some(source) = universe.world(&from) else {
                println!("{}", messages::world_not_found(&from));
                return Ok(());
            };
            let player = source
                .spawn_entity(EntityData::player("cli", Transform::default()))
                .wait()?;
            let placement = match position.as_deref() {
                Some(&[x, y, z]) => Placement::Exact(glam::Vec3::new(x, y, z)),
                _ => Placement::default(),
            };
            let outcome = universe.relocate(&player, &target, placement).outcome();
            println!("{}", messages::teleport(outcome, &target));
            // The stand-in player is not saved with either world.
            universe.despawn(&player).wait()?;
        }
        Commands::Spawn { world, position } => {
            let Some(handle) = universe.world(&world) else {
                println!("{}", messages::world_not_found(&world));
                return Ok(());
            };
            let at = match position.as_slice() {
                &[x, y, z] => glam::Vec3::new(x, y, z),
                _ => anyhow::bail!("expected X Y Z"),
            };
            let player = handle
                .spawn_entity(EntityData::player("cli", Transform::at(at)))
                .wait()?;
            if universe.set_spawn_point(&player).wait()?.is_some() {
                println!("{}", messages::spawn_point_set(handle.name()));
            }
            universe.despawn(&player).wait()?;
        }
    }

    universe.shutdown();
    Ok(())
}

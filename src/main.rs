use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use photo_studio::catalog::Catalog;
use photo_studio::config::Config;
use photo_studio::models::{ImageSize, ScenarioId};
use photo_studio::orchestrator::Orchestrator;
use photo_studio::scenarios::{self, parse_field, ScenarioRequest};
use photo_studio::session::Session;
use photo_studio::Error;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "photo-studio")]
#[command(about = "Generate AI portraits, cameos and posters from your photos")]
struct CliArgs {
    /// Working directory holding config.json, data/ and outputs.
    #[arg(long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Use the offline mock instead of the image API.
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate images for a scenario
    Generate(GenerateArgs),
    /// List available scenarios
    ListScenarios,
    /// List movie characters for the celebrity scenario
    ListCharacters,
    /// List the selectable entries of a scenario
    ListStyles {
        #[arg(long, default_value = "portrait", value_parser = parse_scenario)]
        scenario: ScenarioId,
    },
    /// List couple poses
    ListPoses,
    /// List family or scenario templates
    ListTemplates {
        #[arg(long, value_parser = parse_scenario)]
        scenario: Option<ScenarioId>,
    },
    /// List backgrounds for the couple or family scenario
    ListBackgrounds {
        #[arg(long, value_parser = parse_scenario)]
        scenario: ScenarioId,
    },
    /// Add a custom character to config.json
    AddCharacter {
        name: String,
        prompt: String,
        #[arg(long)]
        scene: Option<String>,
    },
    /// Show the current session
    Status,
    /// Review generated images, reorder and confirm them
    Review {
        /// New display order as 1-based image numbers, e.g. 3,1,2
        #[arg(long, value_delimiter = ',')]
        order: Option<Vec<usize>>,
        #[arg(long)]
        confirm: bool,
    },
    /// Show or change configuration
    Config {
        #[arg(long)]
        show: bool,
        /// section.key=value
        #[arg(long, value_parser = parse_field)]
        set: Vec<(String, String)>,
    },
    /// Delete temporary files, keeping the session
    Cleanup,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// Scenario id; defaults to scenarios.default_scenario from config.json
    #[arg(value_parser = parse_scenario)]
    scenario: Option<ScenarioId>,

    /// Input photo; repeat for multi-person scenarios (order matters)
    #[arg(short, long = "photo")]
    photos: Vec<PathBuf>,

    /// Character name for the celebrity scenario; repeatable
    #[arg(short, long = "character")]
    characters: Vec<String>,

    #[arg(long)]
    style: Option<String>,

    #[arg(long)]
    pose: Option<String>,

    #[arg(long)]
    template: Option<String>,

    #[arg(long)]
    background: Option<String>,

    #[arg(long)]
    prompt: Option<String>,

    #[arg(long)]
    negative_prompt: Option<String>,

    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Template field value as key=value; repeatable
    #[arg(long = "field", value_parser = parse_field)]
    fields: Vec<(String, String)>,

    /// Output size as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size)]
    size: Option<ImageSize>,

    /// Start over even if the previous session was confirmed
    #[arg(long)]
    new_session: bool,

    /// Keep preprocessed photos in the temp directory
    #[arg(long)]
    keep_temp: bool,
}

fn parse_scenario(input: &str) -> std::result::Result<ScenarioId, String> {
    input.parse()
}

fn parse_size(input: &str) -> std::result::Result<ImageSize, String> {
    input.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photo_studio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: CliArgs) -> Result<()> {
    let mut config = Config::load(&args.dir).context("Failed to load configuration")?;
    if args.mock {
        config.mock.enabled = true;
    }

    match args.command {
        Command::Generate(generate_args) => generate(&config, generate_args).await,
        Command::ListScenarios => {
            let catalog = load_catalog(&config)?;
            for scenario in catalog.scenarios() {
                let (min, max) = match scenario.id.parse::<ScenarioId>() {
                    Ok(id) => catalog.photo_limits(id),
                    Err(_) => (scenario.required_photos, scenario.max_photos),
                };
                println!(
                    "{:<10} {} ({}-{} photos) - {}",
                    scenario.id, scenario.name, min, max, scenario.description
                );
            }
            Ok(())
        }
        Command::ListCharacters => {
            let catalog = load_catalog(&config)?;
            for (i, character) in catalog.characters().iter().enumerate() {
                println!("{:>2}. {}", i + 1, character.name);
            }
            Ok(())
        }
        Command::ListStyles { scenario } => list_entries(&load_catalog(&config)?, scenario),
        Command::ListPoses => list_entries(&load_catalog(&config)?, ScenarioId::Couple),
        Command::ListTemplates { scenario } => {
            let catalog = load_catalog(&config)?;
            match scenario {
                Some(id) => list_entries(&catalog, id),
                None => {
                    list_entries(&catalog, ScenarioId::Family)?;
                    for id in ScenarioId::ALL.into_iter().filter(|id| id.is_template_based()) {
                        list_entries(&catalog, id)?;
                    }
                    Ok(())
                }
            }
        }
        Command::ListBackgrounds { scenario } => {
            let catalog = load_catalog(&config)?;
            let backgrounds = catalog.backgrounds(scenario);
            if backgrounds.is_empty() {
                println!("No backgrounds for the {} scenario", scenario);
            }
            for background in backgrounds {
                println!(
                    "{:<16} {}",
                    background.id.as_deref().unwrap_or("-"),
                    background.name
                );
            }
            Ok(())
        }
        Command::AddCharacter {
            name,
            prompt,
            scene,
        } => {
            let character = config.add_character(&name, &prompt, scene)?;
            info!("Added character {}", character.name);
            Ok(())
        }
        Command::Status => {
            let session = Session::load(&config.session_path());
            let state = session.state();
            println!("Session file: {}", session.path().display());
            println!("Step:         {:?}", state.step);
            println!(
                "Scenario:     {}",
                state.scenario.as_deref().unwrap_or("-")
            );
            println!("Photos:       {}", state.user_photos.len());
            println!(
                "Generated:    {}/{}",
                state.generated_images.len(),
                state.image_count
            );
            println!("Confirmed:    {}", state.confirmed);
            println!("Mock mode:    {}", config.mock_enabled());
            Ok(())
        }
        Command::Review { order, confirm } => {
            let mut session = Session::load(&config.session_path());
            if let Some(order) = order {
                let permutation = order
                    .iter()
                    .map(|&n| {
                        n.checked_sub(1)
                            .ok_or_else(|| {
                                Error::InvalidInput("Image numbers start at 1".into())
                            })
                    })
                    .collect::<photo_studio::Result<Vec<_>>>()?;
                session.reorder(&permutation)?;
            }
            if confirm {
                session.confirm()?;
                info!("Images confirmed");
            }
            for (i, path) in session.display_order().iter().enumerate() {
                println!("{:>2}. {}", i + 1, path.display());
            }
            Ok(())
        }
        Command::Config { show, set } => {
            for (key, value) in &set {
                config.set(key, value)?;
                info!("Set {} = {}", key, value);
            }
            if show || set.is_empty() {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            Ok(())
        }
        Command::Cleanup => {
            let orchestrator = Orchestrator::new(&config);
            let removed = orchestrator.cleanup_temp_files();
            println!("Removed {} temporary file(s)", removed);
            Ok(())
        }
    }
}

fn load_catalog(config: &Config) -> Result<Catalog> {
    Ok(Catalog::load(&config.data_dir(), &config.characters)?)
}

fn list_entries(catalog: &Catalog, scenario: ScenarioId) -> Result<()> {
    let rows: Vec<(Option<&str>, &str)> = match scenario {
        ScenarioId::Celebrity => catalog
            .characters()
            .iter()
            .map(|c| (None, c.name.as_str()))
            .collect(),
        ScenarioId::Portrait => catalog
            .portrait_styles()
            .iter()
            .map(|s| (s.id.as_deref(), s.name.as_str()))
            .collect(),
        ScenarioId::Couple => catalog
            .couple_poses()
            .iter()
            .map(|p| (p.id.as_deref(), p.name.as_str()))
            .collect(),
        ScenarioId::Family => catalog
            .family_templates()
            .iter()
            .map(|t| (t.id.as_deref(), t.name.as_str()))
            .collect(),
        ScenarioId::Free => bail!("The free scenario has no catalog entries"),
        id => catalog
            .templates(id)
            .iter()
            .map(|t| (Some(t.id.as_str()), t.name.as_str()))
            .collect(),
    };

    println!("[{}]", scenario);
    for (id, name) in rows {
        println!("  {:<16} {}", id.unwrap_or("-"), name);
    }
    Ok(())
}

async fn generate(config: &Config, args: GenerateArgs) -> Result<()> {
    let scenario = match args.scenario {
        Some(id) => id,
        None => config
            .scenarios
            .default_scenario
            .parse()
            .map_err(|e: String| Error::Config(e))?,
    };

    if !config.mock_enabled() && config.api_key().is_none() {
        return Err(Error::MissingCredential.into());
    }

    let catalog = load_catalog(config)?;
    let request = ScenarioRequest {
        scenario,
        photos: args.photos,
        characters: args.characters,
        style: args.style,
        pose: args.pose,
        template: args.template,
        background: args.background,
        prompt: args.prompt,
        negative_prompt: args.negative_prompt,
        count: args.count,
        fields: args.fields.into_iter().collect(),
        size: args.size,
    };
    let job = scenarios::plan(&request, &catalog, config)?;

    let mut session = Session::load(&config.session_path());
    if args.new_session {
        session.reset()?;
    }

    let orchestrator = Orchestrator::new(config);
    let report = orchestrator.run(&job, &mut session).await?;

    println!(
        "Generated {}/{} image(s) in {}",
        report.succeeded.len(),
        report.total(),
        config.images_dir().display()
    );
    for path in &report.succeeded {
        println!("  {}", path.display());
    }
    for failed in &report.failed {
        println!("  FAILED {}: {}", failed.name, failed.reason);
    }

    if !args.keep_temp {
        orchestrator.cleanup_temp_files();
    }

    if report.succeeded.is_empty() && !report.failed.is_empty() {
        warn!("No images were generated");
        bail!("All {} generation(s) failed", report.failed.len());
    }
    Ok(())
}

//! Optimizer and LR schedule comparison CLI
//!
//! Trains a small MLP on MNIST under several update rules and schedules and
//! writes comparison plots.

use clap::{Parser, Subcommand};
use optlab::{Config, Result};

#[derive(Parser)]
#[command(name = "optlab")]
#[command(about = "Compare optimizers and learning-rate schedules on MNIST", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "optlab.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the optimizer and schedule comparisons (default)
    Run,
    /// Write a default config file
    Init,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run(&config),
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;

    use burn::backend::wgpu::WgpuDevice;
    use burn::backend::{Autodiff, NdArray, Wgpu};
    use burn::tensor::backend::AutodiffBackend;
    use optlab::data::{BatchLoader, ClassificationDataset};
    use optlab::experiment::{Experiment, ExperimentRunner};
    use optlab::model::ClassifierConfig;
    use optlab::report::{render_comparison, task_report};
    use optlab::{DataSourceKind, DeviceKind, LabError};

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Run 'optlab run' to train and compare");

        Ok(())
    }

    pub fn run(config: &Config) -> Result<()> {
        println!("Device: {}", config.run.device);

        match config.run.device {
            DeviceKind::Cpu => run_on::<Autodiff<NdArray<f32>>>(config, Default::default()),
            DeviceKind::Gpu => run_on::<Autodiff<Wgpu<f32, i32>>>(config, WgpuDevice::default()),
        }
    }

    fn load_data(config: &Config) -> Result<(ClassificationDataset, ClassificationDataset)> {
        let (train, test) = match config.data.source {
            DataSourceKind::Mnist => {
                println!("Loading MNIST...");
                (
                    ClassificationDataset::mnist_train()?,
                    ClassificationDataset::mnist_test()?,
                )
            }
            DataSourceKind::Synthetic => {
                println!("Generating synthetic data...");
                ClassificationDataset::synthetic_pair(
                    config.data.synthetic_train_samples,
                    config.data.synthetic_test_samples,
                    config.model.input_dim,
                    config.model.num_classes,
                    config.run.seed,
                )?
            }
        };

        if train.input_dim() != config.model.input_dim
            || train.num_classes() != config.model.num_classes
        {
            return Err(LabError::Configuration(format!(
                "model expects {} inputs and {} classes, data has {} and {}",
                config.model.input_dim,
                config.model.num_classes,
                train.input_dim(),
                train.num_classes()
            )));
        }

        println!("  {} training samples", train.len());
        println!("  {} test samples", test.len());
        Ok((train, test))
    }

    fn run_on<B: AutodiffBackend>(config: &Config, device: B::Device) -> Result<()> {
        let (train, test) = load_data(config)?;

        let train_loader =
            BatchLoader::<B>::new(Arc::new(train), config.data.train_batch_size, device.clone())?
                .shuffle(config.run.seed);
        let test_loader = BatchLoader::<B::InnerBackend>::new(
            Arc::new(test),
            config.data.test_batch_size,
            device.clone(),
        )?;

        let runner = ExperimentRunner::<B>::new(
            device,
            ClassifierConfig::from(&config.model),
            &train_loader,
            &test_loader,
        )
        .with_seed(config.run.seed)
        .continue_on_failure(config.run.continue_on_failure);

        let output_dir = Path::new(&config.run.output_dir);
        std::fs::create_dir_all(output_dir)?;

        let tasks = [
            Experiment::optimizer_comparison(&config.optimizer_task)?,
            Experiment::schedule_comparison(&config.schedule_task)?,
        ];

        for task in &tasks {
            let results = runner.run(task)?;

            let path = output_dir.join(task.artifact());
            match render_comparison(&results, task.panels(), task.title(), &path) {
                Ok(()) => println!("\nSaved {}", path.display()),
                Err(e) => log::warn!("Could not write {}: {}", path.display(), e),
            }

            print!("{}", task_report(task.title(), &results));
        }

        println!("\nAll experiments complete.");
        Ok(())
    }
}

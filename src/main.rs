use std::process::ExitCode;

use backup_runner_lib::cli::{Action, Cli};
use backup_runner_lib::config::Config;
use backup_runner_lib::exec::Context;
use backup_runner_lib::orchestrator::{self, RunError, RunOptions};
use backup_runner_lib::restic::{
    CheckOptions, ForgetOptions, LsOptions, PruneOptions, Restic, SnapshotFilter,
    SnapshotsOptions, StatsOptions, UnlockOptions,
};

use clap::Parser;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // init logger
    let mut env_logger = env_logger::builder();
    if let Some(level) = cli.verbose {
        env_logger.filter_level(level);
    }
    if let Err(e) = env_logger.try_init() {
        eprintln!("Initializing the logger failed: {e}");
    }

    let config = match Config::from_path(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            log::error!(target: "config", "Reading the config file failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let ctx = Context::background();
    match run(&ctx, cli.action, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(ctx: &Context, action: Action, config: &Config) -> Result<(), RunError> {
    let restic = || Restic::new(&config.restic, &config.process);

    match action {
        Action::Backup(args) => {
            let options = RunOptions {
                restic: args.restic,
                clean_up: args.clean_up,
                forget: args.forget,
                unlock: args.unlock && config.restic.unlock,
                tags: args.tags,
                snapshot: None,
            };
            let result = orchestrator::do_backup_for_kind(ctx, &args.kind, config, &options)
                .inspect_err(|_| {
                    log::error!(target: "orchestrator", "Backup of {} resulted in a fatal error", args.kind)
                })?;
            if let Some(result) = result {
                print_json(&result);
            }
        }
        Action::Restore(args) => {
            let options = RunOptions {
                restic: args.restic,
                clean_up: args.clean_up,
                unlock: args.unlock && config.restic.unlock,
                snapshot: args.snapshot,
                ..Default::default()
            };
            orchestrator::do_restore_for_kind(ctx, &args.kind, config, &options).inspect_err(
                |_| log::error!(target: "orchestrator", "Restore of {} resulted in a fatal error", args.kind),
            )?;
        }
        Action::Init => restic().ensure_initialized(ctx)?,
        Action::Snapshots(args) => {
            let options = SnapshotsOptions {
                filter: SnapshotFilter {
                    hosts: args.host,
                    tags: args.tag,
                    ..Default::default()
                },
                latest: args.latest.unwrap_or_default(),
                ..Default::default()
            };
            print_json(&restic().snapshots(ctx, &options)?);
        }
        Action::Ls(args) => {
            let options = LsOptions {
                long: args.long,
                snapshot_id: args.snapshot,
                ..Default::default()
            };
            print_json(&restic().ls(ctx, &options)?);
        }
        Action::Forget(args) => {
            let mut options = ForgetOptions::from(&config.restic.retention);
            options.prune = args.prune;
            options.dry_run = args.dry_run;
            print_json(&restic().forget(ctx, options)?);
        }
        Action::Prune(args) => {
            let options = PruneOptions {
                max_unused: args.max_unused.unwrap_or_default(),
                dry_run: args.dry_run,
                ..Default::default()
            };
            print!("{}", restic().prune(ctx, &options)?);
        }
        Action::Check(args) => {
            let options = CheckOptions {
                read_data: args.read_data,
                read_data_subset: args.read_data_subset.unwrap_or_default(),
                ..Default::default()
            };
            print!("{}", restic().check(ctx, &options)?);
        }
        Action::Unlock(args) => {
            let options = UnlockOptions {
                remove_all: args.remove_all,
            };
            restic().unlock(ctx, &options)?;
        }
        Action::Stats(args) => {
            let options = StatsOptions {
                mode: args.mode,
                snapshot_ids: args.snapshot.into_iter().collect(),
                ..Default::default()
            };
            print_json(&restic().stats(ctx, &options)?);
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => log::error!("Serializing the result failed: {e}"),
    }
}

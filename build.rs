// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: build targets
fn targets_arg() -> Arg {
    Arg::new("targets")
        .required(true)
        .num_args(1..)
        .help("Recipes to resolve")
}

/// Common argument: head checkout for a target
fn head_arg() -> Arg {
    Arg::new("head")
        .long("head")
        .value_name("NAME")
        .action(ArgAction::Append)
        .help("Build this target from its head checkout (repeatable)")
}

/// Common argument: target OS
fn os_arg() -> Arg {
    Arg::new("os")
        .long("os")
        .value_parser(["linux", "macos"])
        .help("Resolve for this OS instead of the host")
}

/// Common argument: compiler checked against `fails_with`
fn compiler_arg() -> Arg {
    Arg::new("compiler")
        .long("compiler")
        .value_name("NAME[@VERSION]")
        .help("Compiler the build will use (default: from config)")
}

fn name_arg() -> Arg {
    Arg::new("name").required(true).help("Recipe name")
}

fn build_cli() -> Command {
    Command::new("cellar")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Cellar Contributors")
        .about("Build packages from declarative recipes, dependencies first")
        .subcommand_required(true)
        .arg(
            Arg::new("recipes")
                .long("recipes")
                .global(true)
                .default_value("recipes")
                .help("Directory holding <name>.toml recipes"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .help("Configuration file (default: <config dir>/cellar/cellar.toml if present)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Increase log verbosity (-v debug, -vv trace)"),
        )
        .subcommand(
            Command::new("plan")
                .about("Show the ordered build plan and its parallel layers")
                .arg(targets_arg())
                .arg(head_arg())
                .arg(os_arg())
                .arg(compiler_arg()),
        )
        .subcommand(
            Command::new("build")
                .about("Build recipes and everything they depend on")
                .arg(targets_arg())
                .arg(head_arg())
                .arg(os_arg())
                .arg(compiler_arg())
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .help("Recipes built at once (default: from config)"),
                )
                .arg(
                    Arg::new("no_test")
                        .long("no-test")
                        .action(ArgAction::SetTrue)
                        .help("Skip smoke tests after building"),
                )
                .arg(
                    Arg::new("keep_builddir")
                        .long("keep-builddir")
                        .action(ArgAction::SetTrue)
                        .help("Keep the build directory of a failed build"),
                ),
        )
        .subcommand(
            Command::new("fetch")
                .about("Download and verify sources without building")
                .arg(targets_arg())
                .arg(head_arg())
                .arg(os_arg())
                .arg(compiler_arg()),
        )
        .subcommand(
            Command::new("test")
                .about("Rerun the smoke tests of an installed recipe")
                .arg(name_arg())
                .arg(
                    Arg::new("head")
                        .long("head")
                        .action(ArgAction::SetTrue)
                        .help("Test the head build"),
                ),
        )
        .subcommand(
            Command::new("deps")
                .about("List everything a recipe depends on, directly or not")
                .arg(name_arg())
                .arg(os_arg()),
        )
        .subcommand(
            Command::new("uses")
                .about("List every recipe that depends on a recipe, directly or not")
                .arg(name_arg())
                .arg(os_arg()),
        )
        .subcommand(
            Command::new("lint")
                .about("Validate recipe files")
                .arg(
                    Arg::new("files")
                        .num_args(0..)
                        .help("Recipe files (default: every recipe in --recipes)"),
                ),
        )
        .subcommand(
            Command::new("info")
                .about("Show recipe metadata and installed versions")
                .arg(name_arg()),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell to generate completions for"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("cellar.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}

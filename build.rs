// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

const DEFAULT_DB_PATH: &str = "/var/lib/mandex/mandex.db";

fn db_path_arg() -> Arg {
    Arg::new("db_path")
        .short('d')
        .long("db-path")
        .value_name("PATH")
        .default_value(DEFAULT_DB_PATH)
        .help("Database path")
}

fn build_cli() -> Command {
    Command::new("mandex")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Mandex Contributors")
        .about("Incremental indexer for manual pages shipped in Arch Linux packages")
        .subcommand_required(false)
        .subcommand(
            Command::new("init")
                .about("Initialize the mandex database")
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("index")
                .about("Fetch the files index and index new or updated packages")
                .arg(db_path_arg())
                .arg(
                    Arg::new("repo")
                        .short('r')
                        .long("repo")
                        .default_value("core")
                        .help("Repository to index"),
                )
                .arg(
                    Arg::new("arch")
                        .short('a')
                        .long("arch")
                        .default_value("x86_64")
                        .help("Package architecture"),
                )
                .arg(
                    Arg::new("mirror")
                        .short('m')
                        .long("mirror")
                        .value_name("URL")
                        .help("Mirror URL template ($repo and $arch are substituted)"),
                )
                .arg(
                    Arg::new("mirrorlist_url")
                        .long("mirrorlist-url")
                        .value_name("URL")
                        .help("pacman mirrorlist URL, used when no mirror is given"),
                )
                .arg(
                    Arg::new("work_dir")
                        .short('w')
                        .long("work-dir")
                        .default_value("/var/cache/mandex")
                        .help("Directory for the files index and downloaded packages"),
                )
                .arg(
                    Arg::new("mandoc")
                        .long("mandoc")
                        .default_value("mandoc")
                        .help("mandoc binary used for rendering"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .default_value("30")
                        .help("HTTP timeout in seconds"),
                )
                .arg(
                    Arg::new("retries")
                        .long("retries")
                        .default_value("3")
                        .help("Download attempts per file"),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Show a manual page, following redirects")
                .arg(Arg::new("name").required(true).help("Page name"))
                .arg(Arg::new("section").help("Section (optional)"))
                .arg(
                    Arg::new("locale")
                        .short('l')
                        .long("locale")
                        .help("Locale (optional, prefers en)"),
                )
                .arg(
                    Arg::new("format")
                        .short('f')
                        .long("format")
                        .value_parser(["text", "html", "raw"])
                        .default_value("text")
                        .help("Output format"),
                )
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("packages")
                .about("List indexed packages")
                .arg(Arg::new("pattern").help("Package name pattern (optional)"))
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("history")
                .about("Show recent indexer runs and corpus totals")
                .arg(
                    Arg::new("limit")
                        .short('n')
                        .long("limit")
                        .default_value("10")
                        .action(ArgAction::Set)
                        .help("Number of runs to show"),
                )
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("mandex.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}

use std::{env, fs, path::PathBuf};

fn html_arg(name: &'static str, help: &'static str) -> clap::Arg {
    clap::Arg::new(name)
        .long(name)
        .help(help)
        .action(clap::ArgAction::Set)
        .value_name("HTML")
        .value_parser(clap::value_parser!(PathBuf))
}

fn output_arg() -> clap::Arg {
    clap::arg!(-o --output <FILE> "Output file (default: stdout)")
        .value_name("FILE")
        .value_parser(clap::value_parser!(PathBuf))
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OUT_DIR");

    let Some(out_dir) = env::var_os("OUT_DIR").map(PathBuf::from) else {
        return;
    };
    let completions_dir = out_dir.join("completions");

    fs::create_dir_all(&completions_dir).unwrap();

    let mut cmd = clap::Command::new("dashmetrics")
        .about("Extract app analytics from saved dashboard pages")
        .arg(
            clap::arg!(--config <FILE> "Extraction config file")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(clap::arg!(-v --verbose "Enable debug logging").global(true))
        .subcommand(
            clap::Command::new("downloads")
                .about("Extract downloads and basic metrics from an overview page")
                .arg(clap::arg!(<HTML> "Saved overview page").value_parser(clap::value_parser!(PathBuf)))
                .arg(output_arg()),
        )
        .subcommand(
            clap::Command::new("revenue")
                .about("Extract revenue by device")
                .arg(clap::arg!(<HTML> "Saved revenue page").value_parser(clap::value_parser!(PathBuf)))
                .arg(output_arg()),
        )
        .subcommand(
            clap::Command::new("behavior")
                .about("Extract per-country user behavior for one or both platforms")
                .arg(html_arg("android", "Saved Android behavior page"))
                .arg(html_arg("ios", "Saved iOS behavior page"))
                .arg(output_arg()),
        )
        .subcommand(
            clap::Command::new("retention")
                .about("Extract monthly and overall retention for one or both platforms")
                .arg(html_arg("android", "Saved Android retention page"))
                .arg(html_arg("ios", "Saved iOS retention page"))
                .arg(output_arg()),
        )
        .subcommand(
            clap::Command::new("aggregate")
                .about("Merge per-family JSON documents into one application record")
                .arg(clap::arg!(--downloads <JSON> "Downloads document").value_parser(clap::value_parser!(PathBuf)))
                .arg(
                    clap::arg!(--revenue <JSON> "Revenue document (repeatable)")
                        .action(clap::ArgAction::Append)
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(clap::arg!(--behavior <JSON> "Behavior document").value_parser(clap::value_parser!(PathBuf)))
                .arg(clap::arg!(--retention <JSON> "Retention document").value_parser(clap::value_parser!(PathBuf)))
                .arg(output_arg()),
        )
        .subcommand(
            clap::Command::new("clean")
                .about("Remove platforms, families, countries or periods from aggregated records")
                .arg(
                    clap::arg!(<JSON> ... "Aggregated record files")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(clap::arg!(--"drop-platform" <PLATFORM> "Platform bucket to drop").action(clap::ArgAction::Append))
                .arg(
                    clap::arg!(--"drop-family" <FAMILY> "Metric family to drop")
                        .action(clap::ArgAction::Append)
                        .value_parser(["downloads", "revenue", "behavior", "retention"]),
                )
                .arg(
                    clap::arg!(--"drop-country" <COUNTRY> "Country/Region row to drop")
                        .action(clap::ArgAction::Append),
                )
                .arg(clap::arg!(--"country-platform" <PLATFORM> "Only drop countries from this platform bucket"))
                .arg(
                    clap::arg!(--"drop-period" <PERIOD> "Year or month (YYYY[-MM]) to drop")
                        .action(clap::ArgAction::Append),
                )
                .arg(output_arg()),
        )
        .subcommand(
            clap::Command::new("split")
                .about("Split aggregated records into complete and incomplete sets")
                .arg(
                    clap::arg!(<JSON> ... "Aggregated record files")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(clap::arg!(--"out-dir" <DIR> "Directory receiving the two envelope files").required(true))
                .arg(
                    clap::arg!(--require <FAMILY> "Families a record needs to be complete")
                        .action(clap::ArgAction::Append)
                        .value_parser(["downloads", "revenue", "behavior", "retention"]),
                ),
        );

    clap_complete::generate_to(clap_complete::shells::Bash, &mut cmd, "dashmetrics", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Zsh, &mut cmd, "dashmetrics", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Fish, &mut cmd, "dashmetrics", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::PowerShell, &mut cmd, "dashmetrics", &completions_dir).unwrap();

    println!(
        "cargo:warning=Shell completions generated in: {}",
        completions_dir.display()
    );
}

//! Shell scripts that run several generation batches in parallel, plus a
//! standalone per-size counter for hosts without this binary.
//!
//! Concurrency in this tool is always several OS processes against one moduli
//! directory. The builder scripts start `runs` background `moduli-assembly
//! generate --all` processes under `nice` and append their output to
//! `all.gen.log`.

use std::fmt;

use crate::frequency::SYSTEM_MODULI_FILE;

/// Log file the builder scripts append to.
pub const BUILD_LOG: &str = "all.gen.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ShellFlavor {
    #[value(alias = "sh")]
    Bash,
    #[value(alias = "tcsh")]
    Csh,
}

impl fmt::Display for ShellFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShellFlavor::Bash => "bash",
            ShellFlavor::Csh => "csh",
        })
    }
}

/// Options for [`builder_script`].
#[derive(Debug, Clone)]
pub struct BuilderOptions {
    pub flavor: ShellFlavor,
    /// Parallel generator processes. Four runs per bit-length give roughly 80
    /// screened moduli each.
    pub runs: u32,
    pub nice: i32,
    /// Command that runs the pipeline.
    pub program: String,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        BuilderOptions {
            flavor: ShellFlavor::Bash,
            runs: 4,
            nice: 15,
            program: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

pub fn builder_script(opts: &BuilderOptions) -> String {
    let runs = opts.runs.max(1);
    match opts.flavor {
        ShellFlavor::Bash => format!(
            r#"#!/usr/bin/env bash

NICE="nice -n {nice}"
GEN_MODULI="{program}"
GEN_OPTS="generate --all"

# {runs} parallel runs of the full pipeline, one per background process.
for ((i = 0; i < {runs}; i++)); do
    ${{NICE}} ${{GEN_MODULI}} ${{GEN_OPTS}} >> {log} 2>&1 &
done
wait
"#,
            nice = opts.nice,
            program = opts.program,
            runs = runs,
            log = BUILD_LOG,
        ),
        ShellFlavor::Csh => {
            let run_list = (0..runs).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
            format!(
                r#"#!/usr/bin/env csh
set NICE="nice +{nice}"
set GEN_MODULI="{program}"
set GEN_OPTS="generate --all"

# {runs} parallel runs of the full pipeline, one per background process.
foreach run ( {run_list} )
    $NICE $GEN_MODULI $GEN_OPTS >>& {log} &
end
wait
"#,
                nice = opts.nice,
                program = opts.program,
                runs = runs,
                run_list = run_list,
                log = BUILD_LOG,
            )
        }
    }
}

/// Bash script counting the records of each enabled size in a moduli file
/// (first argument, default `/etc/ssh/moduli`) with `grep`.
pub fn frequency_script(enabled: &[u32]) -> String {
    let sizes = enabled
        .iter()
        .filter(|&&bits| bits > 0)
        .map(|&bits| (bits - 1).to_string())
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        r#"#!/usr/bin/env bash

GREP=grep
MODULI_FILE="${{1:-{default}}}"

printf '\nProcessing Moduli File: %s\n' "${{MODULI_FILE}}"

for moduli in {sizes}
do
    count=$(${{GREP}} -c " ${{moduli}} " "${{MODULI_FILE}}")
    echo "${{moduli}}: ${{count}}"
done
"#,
        default = SYSTEM_MODULI_FILE,
        sizes = sizes,
    )
}

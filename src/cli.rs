use crate::ids::IdStrategy;
use crate::CompileOptions;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "bitter-rs",
    about = "Compiles bitter sources into Scratch 3 projects (.sb3)."
)]
pub struct Args {
    /// Project directory (stage.gs plus one .gs file per sprite) or a single .gs file.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[arg(value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    #[arg(long, help = "Also write <name>.debug.json with the project and procedure metadata.")]
    pub debug: bool,

    #[arg(long, help = "Disable automatic SVG normalization to 64x64.")]
    pub no_svg_scale: bool,

    #[arg(long, help = "Use readable per-target counters instead of random block ids.")]
    pub sequential_ids: bool,

    #[arg(long, help = "Build targets on parallel threads.")]
    pub parallel: bool,

    #[arg(short, long, help = "Log compiler internals to stderr.")]
    pub verbose: bool,
}

impl Args {
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            ids: if self.sequential_ids {
                IdStrategy::Sequential
            } else {
                IdStrategy::Random
            },
            scale_svgs: !self.no_svg_scale,
            parallel: self.parallel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_compile_options() {
        let args = Args::parse_from(["bitter-rs", "game", "game.sb3", "--sequential-ids", "--no-svg-scale"]);
        let options = args.compile_options();
        assert_eq!(options.ids, IdStrategy::Sequential);
        assert!(!options.scale_svgs);
        assert!(!options.parallel);
        assert_eq!(args.output, Some(PathBuf::from("game.sb3")));
    }
}

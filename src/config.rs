/// Which environment variables launched programs receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvPolicy {
    /// Launch with an empty environment. Programs are still looked up on
    /// the shell's own `PATH`.
    #[default]
    Minimal,
    /// Pass the shell's environment through unchanged.
    Inherit,
}

/// Startup options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub emit_prompt: bool,
    pub verbose: bool,
    pub env_policy: EnvPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            emit_prompt: true,
            verbose: false,
            env_policy: EnvPolicy::Minimal,
        }
    }
}

/// What the command line asked for.
#[derive(Debug, PartialEq, Eq)]
pub enum Startup {
    Run(Config),
    Usage,
}

pub const PROMPT: &str = "tsh> ";

pub const USAGE: &str = "\
Usage: tsh [-hvpe]
   -h   print this message
   -v   print additional diagnostic information
   -p   do not emit a command prompt
   -e   pass the shell's environment to launched programs
";

impl Config {
    /// Parse startup flags (`-hvpe`, combinable as in `-vp`).
    pub fn from_args<I, S>(args: I) -> Startup
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Config::default();

        for arg in args {
            let Some(flags) = arg.as_ref().strip_prefix('-') else {
                return Startup::Usage;
            };
            if flags.is_empty() {
                return Startup::Usage;
            }
            for flag in flags.chars() {
                match flag {
                    'v' => config.verbose = true,
                    'p' => config.emit_prompt = false,
                    'e' => config.env_policy = EnvPolicy::Inherit,
                    _ => return Startup::Usage,
                }
            }
        }

        Startup::Run(config)
    }

    /// Default tracing filter when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose { "tsh=debug" } else { "warn" }
    }
}

use memjudge_core::Config;

use crate::{cmd::Args, util};

pub fn with_args(mut cfg: Config, args: &Args) -> Config {
    let Args {
        tests_dir: _,
        code_dir: _,
        compiler_path,
        clean: _,
        abort_on_fail: _,
        tests: _,
        config: _,
        timeout,
        stress_timeout,
        stress_from,
        leak_threshold,
        poll_interval,
        sampler,
        detail: _,
        print_example_config: _,
    } = args;

    compiler_path.as_ref().map(|p| cfg.build.compiler = p.clone());
    timeout.map(|t| cfg.test.timeout_secs = t);
    stress_timeout.map(|t| cfg.test.stress_timeout_secs = t);
    stress_from.map(|id| cfg.test.stress_from = id);
    leak_threshold.map(|mb| cfg.test.leak_threshold_mb = mb);
    poll_interval.map(|ms| cfg.test.poll_interval_ms = ms);
    sampler.map(|s| cfg.test.sampler = s.into());
    cfg
}

pub fn load_with_args(args: &Args) -> anyhow::Result<Config> {
    let cfg = Config::load(args.config.as_deref(), util::current_dir()?)?;
    if let Some(path) = &cfg.source_config_file {
        log::info!("Loaded {}", util::display_path(path));
    }
    Ok(with_args(cfg, args))
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use clap::Parser as _;
    use memjudge_core::testing::SamplerKind;

    use super::*;

    #[test]
    fn args_override_config() {
        let args = Args::try_parse_from([
            "memjudge",
            "--compiler-path",
            "clang++",
            "--timeout",
            "2",
            "--stress-from",
            "7",
            "--leak-threshold",
            "12.5",
            "--sampler",
            "ps",
        ])
        .unwrap();
        let cfg = with_args(Config::default(), &args);

        assert_eq!(cfg.build.compiler, Path::new("clang++"));
        assert_eq!(cfg.test.timeout_secs, 2);
        assert_eq!(cfg.test.stress_timeout_secs, 600);
        assert_eq!(cfg.test.stress_from, 7);
        assert_eq!(cfg.test.leak_threshold_mb, 12.5);
        assert_eq!(cfg.test.sampler, SamplerKind::Ps);
    }

    #[test]
    fn no_args_keeps_config() {
        let args = Args::try_parse_from(["memjudge"]).unwrap();
        assert_eq!(with_args(Config::default(), &args), Config::default());
    }
}

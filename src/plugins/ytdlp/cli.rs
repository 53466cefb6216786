use crate::plugins::registry::{CliPlugin, ResolverContext};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

pub struct YtDlpCliPlugin;

impl YtDlpCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for YtDlpCliPlugin {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn augment_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("ytdlp_bin")
                .long("ytdlp-bin")
                .help_heading("yt-dlp")
                .global(true)
                .help("Path to the yt-dlp executable")
                .env("PLAYLIST_DL_YTDLP")
                .default_value("yt-dlp")
                .num_args(1),
        )
        .arg(
            Arg::new("ytdlp_timeout_secs")
                .long("ytdlp-timeout-secs")
                .help_heading("yt-dlp")
                .global(true)
                .help("Socket timeout passed to yt-dlp, in seconds")
                .default_value("30")
                .num_args(1),
        )
        .arg(
            Arg::new("offline")
                .long("offline")
                .help_heading("yt-dlp")
                .global(true)
                .help("Never call yt-dlp; serve demo data instead")
                .action(ArgAction::SetTrue),
        )
    }

    fn apply_matches(&self, matches: &ArgMatches, ctx: &mut ResolverContext) -> anyhow::Result<()> {
        if let Some(bin) = matches.get_one::<String>("ytdlp_bin") {
            ctx.binary = PathBuf::from(bin);
        }
        if let Some(s) = matches.get_one::<String>("ytdlp_timeout_secs") {
            ctx.socket_timeout_secs = s.parse()?;
        }
        ctx.offline = matches.get_flag("offline");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_flags() {
        let plugin = YtDlpCliPlugin::new();
        let cmd = plugin.augment_command(Command::new("t"));
        let m = cmd
            .try_get_matches_from(["t", "--ytdlp-bin", "/opt/yt-dlp", "--ytdlp-timeout-secs", "5", "--offline"])
            .unwrap();
        let mut ctx = ResolverContext::default();
        plugin.apply_matches(&m, &mut ctx).unwrap();
        assert_eq!(ctx.binary, PathBuf::from("/opt/yt-dlp"));
        assert_eq!(ctx.socket_timeout_secs, 5);
        assert!(ctx.offline);
    }

    #[test]
    fn rejects_bad_timeout() {
        let plugin = YtDlpCliPlugin::new();
        let m = plugin
            .augment_command(Command::new("t"))
            .try_get_matches_from(["t", "--ytdlp-timeout-secs", "soon"])
            .unwrap();
        assert!(plugin.apply_matches(&m, &mut ResolverContext::default()).is_err());
    }
}

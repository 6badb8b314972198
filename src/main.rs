//! `flic_util`: encode a PNM image to the codec's wire format, or decode it
//! back (optionally truncated at a given zoom-schedule step).

use flic_codec::{decode, decode_truncated, encode, pnm, EncodeOptions};
use log::error;
use std::fs;
use std::process::ExitCode;

const GIT_VERSION: &str = git_version::git_version!(fallback = "unknown");

fn usage() -> &'static str {
    "usage:\n  \
     flic_util <src.pnm> <dst.flic>            encode\n  \
     flic_util -d <src.flic> <dst.pnm>         decode\n  \
     flic_util -d <N> <src.flic> <dst.pnm>     decode, truncated at step N"
}

fn run() -> anyhow::Result<()> {
    simple_logger::init_with_level(log::Level::Info).ok();
    log::info!("flic_util {GIT_VERSION}");

    let mut args = pico_args::Arguments::from_env();
    let decode_mode = args.contains("-d");

    if decode_mode {
        let rest = args.finish();
        let rest: Vec<String> = rest.into_iter().map(|s| s.to_string_lossy().into_owned()).collect();
        let (last_step, src, dst) = match rest.len() {
            3 => (Some(rest[0].parse::<u64>()?), rest[1].clone(), rest[2].clone()),
            2 => (None, rest[0].clone(), rest[1].clone()),
            _ => anyhow::bail!("{}", usage()),
        };
        let bytes = fs::read(&src)?;
        let (image, report) = match last_step {
            Some(n) => decode_truncated(bytes.as_slice(), n)?,
            None => decode(bytes.as_slice())?,
        };
        if report.truncated {
            log::info!("decode truncated as requested");
        }
        if let Some(false) = report.checksum_ok {
            log::error!("checksum mismatch: decoded image may not match the original");
        }
        let mut out = fs::File::create(&dst)?;
        pnm::save(&image, &mut out)?;
    } else {
        let src: String = args.free_from_str()?;
        let dst: String = args.free_from_str()?;
        let bytes = fs::read(&src)?;
        let image = pnm::load(&bytes)?;
        let ranges = flic_codec::StaticColorRanges::new(
            (0..image.num_planes()).map(|p| (image.planes[p].min, image.planes[p].max)).collect(),
        );
        let mut out = fs::File::create(&dst)?;
        encode(&image, &ranges, EncodeOptions::default(), &mut out)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("{}", usage());
            ExitCode::from(1)
        }
    }
}

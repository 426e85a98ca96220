use super::{
    config_error_message, core_error_message, json_pretty, package_error_message, spin_fail,
    spin_ok, spinner, EXIT_SUCCESS,
};
use crate::ComposeArgs;
use ovakit_core::{VirtualMachine, VmdkConvert};
use ovakit_package::{
    ComposeOptions, Composer, HashAlgorithm, OutputFormat, SigningStrategy, TarFormat,
};
use ovakit_schema::{load_document, parse_document_str, parse_param_arg, ParamSet, ToolSettings};
use std::io::Read;
use std::path::Path;
use tracing::debug;

fn load_settings(path: Option<&Path>) -> Result<ToolSettings, String> {
    let settings = match path {
        Some(p) => ToolSettings::load(p),
        None => ToolSettings::load_default(),
    };
    settings.map_err(config_error_message)
}

fn parse_with<T, E>(value: &str, parse: impl FnOnce(&str) -> Result<T, E>) -> Result<T, String>
where
    E: Into<ovakit_package::PackageError>,
{
    parse(value).map_err(|e| package_error_message(&e.into()))
}

fn build_options(args: &ComposeArgs, settings: &ToolSettings) -> Result<ComposeOptions, String> {
    let checksum: HashAlgorithm = parse_with(
        args.checksum_type.as_deref().unwrap_or(settings.checksum()),
        str::parse::<HashAlgorithm>,
    )?;
    let sign_alg = args
        .sign_alg
        .as_deref()
        .map(|a| parse_with(a, str::parse::<HashAlgorithm>))
        .transpose()?;
    let tar_format: TarFormat = parse_with(
        args.tar_format.as_deref().unwrap_or(settings.tar_format()),
        str::parse::<TarFormat>,
    )?;
    let format = args
        .format
        .as_deref()
        .map(|f| parse_with(f, str::parse::<OutputFormat>))
        .transpose()?;

    let signer = match &args.sign_script {
        Some(script) => SigningStrategy::Script {
            script: script.clone(),
        },
        None => SigningStrategy::Builtin {
            openssl: args
                .openssl
                .clone()
                .unwrap_or_else(|| settings.openssl().to_path_buf()),
        },
    };

    Ok(ComposeOptions {
        output: args.output.clone(),
        format,
        manifest: args.manifest,
        checksum,
        sign_key: args.sign.clone(),
        sign_alg,
        signer,
        tar_format,
    })
}

fn parse_params(args: &ComposeArgs) -> Result<ParamSet, String> {
    let mut params = ParamSet::new();
    for arg in &args.params {
        let (key, value) = parse_param_arg(arg).map_err(config_error_message)?;
        params.insert(key, value);
    }
    Ok(params)
}

fn load_vm(
    args: &ComposeArgs,
    params: &ParamSet,
    settings: &ToolSettings,
) -> Result<VirtualMachine, String> {
    let doc = if args.input.as_os_str() == "-" {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| format!("config error: failed to read stdin: {e}"))?;
        parse_document_str(&input, params)
    } else {
        load_document(&args.input, params)
    }
    .map_err(|e| format!("config error: {}: {e}", args.input.display()))?;

    let converter = VmdkConvert::new(
        args.vmdk_convert
            .clone()
            .unwrap_or_else(|| settings.vmdk_convert().to_path_buf()),
    );
    VirtualMachine::from_document(&doc, &converter).map_err(core_error_message)
}

pub fn run(args: &ComposeArgs, config: Option<&Path>, json: bool) -> Result<u8, String> {
    let settings = load_settings(config)?;
    debug!("settings: {settings:?}");

    // option values are checked before the input is read
    let options = build_options(args, &settings)?;
    let params = parse_params(args)?;
    let composer = Composer::new(options).map_err(|e| package_error_message(&e))?;

    let show_progress = !json && !args.quiet;
    if show_progress {
        println!(
            "creating '{}' with format '{}' from '{}'",
            args.output.display(),
            composer.format(),
            args.input.display()
        );
    }

    let vm = load_vm(args, &params, &settings)?;

    let pb = show_progress.then(|| spinner(&format!("composing {}...", vm.name)));
    let report = match composer.compose(&vm) {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("wrote {}", r.output.display()));
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "compose failed");
            }
            return Err(package_error_message(&e));
        }
    };

    if json {
        println!("{}", json_pretty(&report)?);
    } else if !args.quiet {
        if let Some(mf) = &report.manifest {
            println!("manifest: {mf}");
        }
        if let Some(cert) = &report.certificate {
            println!("certificate: {cert}");
        }
        println!("done.");
    }
    Ok(EXIT_SUCCESS)
}

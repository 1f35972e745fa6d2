use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process;
use weights_converter::{convert_file, inspect_container, Codec, ConvertConfig, RuleSet};

fn main() {
    env_logger::init();

    let matches = Command::new("convert_weights")
        .version(env!("CARGO_PKG_VERSION"))
        .about("PyTorch 체크포인트를 HDF5 컨테이너로 변환")
        .subcommand_required(true)
        .subcommand(
            Command::new("convert")
                .about("체크포인트(.pt) 변환")
                .arg(
                    Arg::new("checkpoint")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("변환할 .pt 파일")
                )
                .arg(
                    Arg::new("output-dir")
                        .long("output")
                        .short('o')
                        .value_name("DIR")
                        .value_parser(value_parser!(PathBuf))
                        .help("출력 디렉토리 (기본값 ./)")
                )
                .arg(
                    Arg::new("compression")
                        .long("compression")
                        .short('c')
                        .value_name("CODEC")
                        .help("가중치 압축 방식: gzip 또는 none (기본값 gzip)")
                )
                .arg(
                    Arg::new("level")
                        .long("level")
                        .short('l')
                        .value_name("LEVEL")
                        .value_parser(value_parser!(u32))
                        .help("gzip 압축 레벨 (0-9, 기본값 4)")
                )
                .arg(
                    Arg::new("rules")
                        .long("rules")
                        .value_name("RULES")
                        .help("축 변환 규칙: whisper 또는 identity (기본값 whisper)")
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON 설정 파일 (명령행 옵션이 우선)")
                )
                .arg(
                    Arg::new("verify")
                        .long("verify")
                        .action(ArgAction::SetTrue)
                        .help("저장 후 다시 읽어서 비교")
                )
                .arg(
                    Arg::new("no-progress")
                        .long("no-progress")
                        .action(ArgAction::SetTrue)
                        .help("진행 표시줄 숨기기")
                )
        )
        .subcommand(
            Command::new("inspect")
                .about("변환된 .h5 파일 내용 확인")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help(".h5 파일 경로")
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("JSON으로 출력")
                )
        )
        .get_matches();

    let result = match matches.subcommand() {
        Some(("convert", sub_matches)) => handle_convert(sub_matches),
        Some(("inspect", sub_matches)) => handle_inspect(sub_matches),
        _ => {
            println!("❌ 명령을 지정해주세요. --help를 참조하세요.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("❌ 오류: {:#}", e);
        process::exit(1);
    }
}

/// 설정 파일 → 명령행 옵션 순서로 덮어쓴 설정
fn build_config(matches: &ArgMatches) -> Result<ConvertConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ConvertConfig::from_json_file(path)?,
        None => ConvertConfig::default(),
    };

    if let Some(dir) = matches.get_one::<PathBuf>("output-dir") {
        config.output_dir = dir.clone();
    }
    if let Some(codec) = matches.get_one::<String>("compression") {
        config.compression = codec.parse::<Codec>()?;
    }
    if let Some(level) = matches.get_one::<u32>("level") {
        config.gzip_level = *level;
    }
    if let Some(rules) = matches.get_one::<String>("rules") {
        config.rules = rules.parse::<RuleSet>()?;
    }
    if matches.get_flag("verify") {
        config.verify = true;
    }
    if matches.get_flag("no-progress") {
        config.show_progress = false;
    }

    config.validate()?;
    Ok(config)
}

fn handle_convert(matches: &ArgMatches) -> Result<()> {
    let checkpoint = matches
        .get_one::<PathBuf>("checkpoint")
        .context("checkpoint path is required")?;
    let config = build_config(matches)?;

    println!("🔄 변환 시작:");
    println!("   입력: {}", checkpoint.display());
    println!("   출력 디렉토리: {}", config.output_dir.display());
    println!("   압축: {}", config.compression());
    println!("   규칙: {}", config.rules.table().name());

    let report = convert_file(checkpoint, &config)
        .with_context(|| format!("failed to convert {}", checkpoint.display()))?;

    println!("\n✅ 변환 완료: {}", report.output.display());
    println!("   dims: {}개", report.container.dims);
    println!(
        "   가중치: {}개 (permute {}, transpose {})",
        report.container.weights,
        report.transforms.count(weights_converter::TransformKind::Permute210),
        report.transforms.count(weights_converter::TransformKind::TransposeLastTwo)
    );
    println!(
        "   크기: {:.2} MB → {:.2} MB ({:.1}%)",
        report.container.raw_bytes as f64 / 1_048_576.0,
        report.container.file_bytes as f64 / 1_048_576.0,
        report.container.ratio() * 100.0
    );
    if report.verified {
        println!("   검증: 통과");
    }
    println!("   소요 시간: {:.2}초", report.elapsed_secs);

    Ok(())
}

fn handle_inspect(matches: &ArgMatches) -> Result<()> {
    let path = matches
        .get_one::<PathBuf>("file")
        .context("file path is required")?;
    let info = inspect_container(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("📋 {} ({:.2} MB)", info.path.display(), info.file_bytes as f64 / 1_048_576.0);

    println!("\n📐 dims:");
    for (name, value) in &info.dims {
        println!("  {}: {}", name, value);
    }

    println!("\n🗜️ model_state_dict ({}개, 파라미터 {}개):", info.datasets.len(), info.total_parameters());
    for dataset in &info.datasets {
        println!(
            "  {}: {:?} {}{} ({} bytes)",
            dataset.name,
            dataset.shape,
            dataset.dtype,
            if dataset.compressed { " gzip" } else { "" },
            dataset.stored_bytes
        );
    }

    Ok(())
}

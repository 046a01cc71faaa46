use isolink_field::{BinaryField, FieldCodec};
use serde::Serialize;

use crate::cmd::CodecArgs;
use crate::exit::{field_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_raw, OutputFormat};

#[derive(Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
struct CodecOutput {
    operation: &'static str,
    encoding: String,
    length: usize,
    input: String,
    output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    consumed: Option<usize>,
}

pub fn pack(args: CodecArgs, format: OutputFormat) -> CliResult<i32> {
    let codec = build_codec(&args)?;
    let value = decode_hex(&args.value)?;
    let packed = codec
        .pack(&BinaryField::new(args.field, value))
        .map_err(|err| field_error("pack failed", err))?;

    emit(
        CodecOutput {
            operation: "pack",
            encoding: encoding_name(&args),
            length: args.length,
            input: args.value.trim().to_ascii_uppercase(),
            output: hex::encode_upper(&packed),
            consumed: None,
        },
        &packed,
        format,
    );
    Ok(SUCCESS)
}

pub fn unpack(args: CodecArgs, format: OutputFormat) -> CliResult<i32> {
    let codec = build_codec(&args)?;
    let packed = decode_hex(&args.value)?;
    let mut field = BinaryField::empty(args.field);
    let consumed = codec
        .unpack(&mut field, &packed, 0)
        .map_err(|err| field_error("unpack failed", err))?;
    if consumed < packed.len() {
        tracing::warn!(
            consumed,
            trailing = packed.len() - consumed,
            "input continues past the field"
        );
    }

    emit(
        CodecOutput {
            operation: "unpack",
            encoding: encoding_name(&args),
            length: args.length,
            input: args.value.trim().to_ascii_uppercase(),
            output: hex::encode_upper(field.value()),
            consumed: Some(consumed),
        },
        field.value(),
        format,
    );
    Ok(SUCCESS)
}

fn build_codec(args: &CodecArgs) -> CliResult<FieldCodec> {
    FieldCodec::new(args.encoding.into(), args.length, "cli")
        .map_err(|err| field_error("invalid codec", err))
}

fn decode_hex(text: &str) -> CliResult<Vec<u8>> {
    hex::decode(text.trim())
        .map_err(|err| CliError::new(DATA_INVALID, format!("value is not hex: {err}")))
}

fn encoding_name(args: &CodecArgs) -> String {
    match args.encoding {
        crate::cmd::EncodingArg::FixedHex => "fixed-hex".to_string(),
        crate::cmd::EncodingArg::LllBinary => "lll-binary".to_string(),
    }
}

fn emit(out: CodecOutput, bytes: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table | OutputFormat::Pretty => println!("{}", out.output),
        OutputFormat::Raw => print_raw(bytes),
    }
}

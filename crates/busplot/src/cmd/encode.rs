use std::fs::OpenOptions;
use std::io::Write;

use busplot_frame::{
    encode_request, ApplyArgument, FrameError, Message, RemoveVariable, UpdateVariable,
    VariableAlias, SOF,
};

use crate::cmd::{EncodeArgs, EncodeMessage};
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_encoded, OutputFormat};

/// A message encoded as a complete frame.
struct Encoded {
    name: &'static str,
    command: u16,
    frame: Vec<u8>,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let encoded = encode_message(&args.message).map_err(|err| frame_error("encode failed", err))?;

    let mut wire = line_noise(args.garbage);
    wire.extend_from_slice(&encoded.frame);

    if let Some(path) = &args.out {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(args.append)
            .truncate(!args.append)
            .open(path)
            .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))?;
        file.write_all(&wire)
            .map_err(|err| io_error(&format!("failed writing {}", path.display()), err))?;
    }

    print_encoded(encoded.name, encoded.command, &wire, format);
    Ok(SUCCESS)
}

fn encode_message(message: &EncodeMessage) -> Result<Encoded, FrameError> {
    match message {
        EncodeMessage::Alias { variable_id, alias } => {
            framed(&VariableAlias::new(*variable_id, alias))
        }
        EncodeMessage::Update { variable_id, value } => framed(&UpdateVariable {
            variable_id: *variable_id,
            value: *value,
        }),
        EncodeMessage::Remove { variable_id } => framed(&RemoveVariable {
            variable_id: *variable_id,
        }),
        EncodeMessage::Apply { p, i, d } => framed(&ApplyArgument {
            p: *p,
            i: *i,
            d: *d,
        }),
    }
}

fn framed<M: Message>(message: &M) -> Result<Encoded, FrameError> {
    Ok(Encoded {
        name: M::NAME,
        command: M::COMMAND,
        frame: encode_request(message)?.to_vec(),
    })
}

/// Deterministic filler bytes that never contain the start-of-frame marker.
fn line_noise(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| {
            let b = (i as u8).wrapping_mul(37).wrapping_add(11);
            if b == SOF {
                0x00
            } else {
                b
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use busplot_frame::{decode_request, PidArgument};

    use super::*;

    #[test]
    fn line_noise_never_contains_sof() {
        let noise = line_noise(1024);
        assert_eq!(noise.len(), 1024);
        assert!(!noise.contains(&SOF));
        assert_eq!(line_noise(3), line_noise(3));
    }

    #[test]
    fn encodes_every_message_kind() {
        let update = encode_message(&EncodeMessage::Update {
            variable_id: 7,
            value: -2.5,
        })
        .unwrap();
        assert_eq!(update.name, "update-variable");
        assert_eq!(update.command, 0x0020);
        assert_eq!(
            decode_request::<UpdateVariable>(&update.frame).unwrap(),
            UpdateVariable {
                variable_id: 7,
                value: -2.5
            }
        );

        let alias = encode_message(&EncodeMessage::Alias {
            variable_id: 1,
            alias: "Foo".into(),
        })
        .unwrap();
        assert_eq!(alias.frame.len(), 18);

        let apply = encode_message(&EncodeMessage::Apply {
            p: PidArgument::new(1.0, 2.0, 3.0),
            i: PidArgument::default(),
            d: PidArgument::default(),
        })
        .unwrap();
        assert_eq!(apply.command, 0x0040);
        assert_eq!(apply.frame.len(), 42);

        let remove = encode_message(&EncodeMessage::Remove { variable_id: 9 }).unwrap();
        assert_eq!(remove.frame.len(), 8);
    }
}

//! Parsing of operator-supplied option specs.
//!
//! Each spec is `CODE=VALUE` or `CODE[FORMAT]=VALUE`, where CODE is a
//! decimal option number and FORMAT selects how VALUE becomes bytes:
//! `string` (the default), `ip`, `hex`, `bool`, `option`, `message`, `mac`
//! or `time`.

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::options::{DhcpOption, MessageType, OptionCode};

pub fn parse_specs(specs: &[String]) -> Result<Vec<DhcpOption>> {
    specs.iter().map(|spec| parse_spec(spec)).collect()
}

pub fn parse_spec(spec: &str) -> Result<DhcpOption> {
    let (code, format, value) = split_spec(spec)?;

    if code.is_empty() {
        return Err(Error::OptionParse("missing option code".to_string()));
    }
    let code: u8 = code
        .parse()
        .map_err(|_| Error::OptionParse(format!("invalid option code: {}", code)))?;

    let data = match format {
        "" | "string" => parse_string(value),
        "ip" => parse_ip(value)?,
        "hex" => parse_hex(value)?,
        "bool" => parse_bool(value)?,
        "option" => parse_option_codes(value)?,
        "message" => parse_message(value)?,
        "mac" => parse_mac(value)?,
        "time" => parse_time(value)?,
        other => {
            return Err(Error::OptionParse(format!(
                "unsupported value format: {}",
                other
            )));
        }
    };

    if data.len() > u8::MAX as usize {
        return Err(Error::OptionParse(format!(
            "option {} value exceeds 255 bytes",
            code
        )));
    }

    Ok(DhcpOption::new(code, data))
}

/// Splits `CODE[FORMAT]=VALUE` into its three parts. The value may itself
/// contain `=`; only the first separator after the code (and format, when
/// present) counts.
fn split_spec(spec: &str) -> Result<(&str, &str, &str)> {
    match (spec.find('['), spec.find(']')) {
        (Some(open), Some(close)) if open < close => {
            let code = &spec[..open];
            let format = &spec[open + 1..close];
            let rest = &spec[close + 1..];
            let value = match rest.strip_prefix('=') {
                Some(value) => value,
                None if rest.is_empty() => "",
                None => {
                    return Err(Error::OptionParse(format!(
                        "expected '=' after format in: {}",
                        spec
                    )));
                }
            };
            Ok((code, format, value))
        }
        (None, None) => match spec.split_once('=') {
            Some((code, value)) => Ok((code, "", value)),
            None => Ok((spec, "", "")),
        },
        _ => Err(Error::OptionParse(format!(
            "unbalanced brackets in: {}",
            spec
        ))),
    }
}

fn parse_string(value: &str) -> Vec<u8> {
    value.as_bytes().to_vec()
}

fn parse_ip(value: &str) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    for part in value.split(',') {
        let ip = Ipv4Addr::from_str(part.trim())
            .map_err(|_| Error::OptionParse(format!("{} is not a valid IPv4 address", part)))?;
        data.extend_from_slice(&ip.octets());
    }
    Ok(data)
}

fn parse_hex(value: &str) -> Result<Vec<u8>> {
    if value.len() % 2 != 0 {
        return Err(Error::OptionParse(
            "hex value must have an even number of digits".to_string(),
        ));
    }
    (0..value.len())
        .step_by(2)
        .map(|index| {
            u8::from_str_radix(&value[index..index + 2], 16)
                .map_err(|_| Error::OptionParse(format!("invalid hex value: {}", value)))
        })
        .collect()
}

fn parse_bool(value: &str) -> Result<Vec<u8>> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Ok(vec![1]),
        "0" | "f" | "false" => Ok(vec![0]),
        other => Err(Error::OptionParse(format!(
            "{} is not a valid boolean",
            other
        ))),
    }
}

/// Comma-separated option codes, one byte each. Entries may be decimal
/// numbers or known option names; unknown names and unnamed codes are
/// rejected.
fn parse_option_codes(value: &str) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    for part in value.split(',') {
        let part = part.trim();
        let code = match part.parse::<u8>() {
            Ok(number) => {
                OptionCode::try_from(number)
                    .map_err(|_| Error::OptionParse(format!("unsupported option: {}", part)))?;
                number
            }
            Err(_) => OptionCode::from_name(part)
                .map(|code| code as u8)
                .ok_or_else(|| Error::OptionParse(format!("unsupported option: {}", part)))?,
        };
        data.push(code);
    }
    Ok(data)
}

fn parse_message(value: &str) -> Result<Vec<u8>> {
    let msg_type = MessageType::from_name(value.trim())
        .ok_or_else(|| Error::OptionParse(format!("{} is not a message type", value)))?;
    Ok(vec![msg_type as u8])
}

fn parse_mac(value: &str) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    for part in value.split(',') {
        data.extend_from_slice(&parse_single_mac(part.trim())?);
    }
    Ok(data)
}

pub fn parse_single_mac(value: &str) -> Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = value.split([':', '-']);
    for byte in mac.iter_mut() {
        let part = parts
            .next()
            .ok_or_else(|| Error::OptionParse(format!("{} is not a valid MAC address", value)))?;
        *byte = u8::from_str_radix(part, 16)
            .map_err(|_| Error::OptionParse(format!("{} is not a valid MAC address", value)))?;
    }
    if parts.next().is_some() {
        return Err(Error::OptionParse(format!(
            "{} is not a valid MAC address",
            value
        )));
    }
    Ok(mac)
}

/// Duration literals like `30s`, `10m` or `1h30m`, encoded as 4-byte
/// big-endian seconds.
fn parse_time(value: &str) -> Result<Vec<u8>> {
    let duration = parse_duration(value)?;
    let seconds = u32::try_from(duration.as_secs())
        .map_err(|_| Error::OptionParse(format!("duration too large: {}", value)))?;
    Ok(seconds.to_be_bytes().to_vec())
}

fn parse_duration(value: &str) -> Result<Duration> {
    if value.is_empty() {
        return Err(Error::OptionParse("empty duration".to_string()));
    }

    let mut total = 0u64;
    let mut digits = String::new();
    let mut seen_unit = false;

    for c in value.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.is_empty() {
            return Err(Error::OptionParse(format!("invalid duration: {}", value)));
        }
        let amount: u64 = digits
            .parse()
            .map_err(|_| Error::OptionParse(format!("invalid duration: {}", value)))?;
        let scale = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86400,
            _ => {
                return Err(Error::OptionParse(format!(
                    "unknown duration unit in: {}",
                    value
                )));
            }
        };
        total = total.saturating_add(amount.saturating_mul(scale));
        digits.clear();
        seen_unit = true;
    }

    if !digits.is_empty() || !seen_unit {
        return Err(Error::OptionParse(format!(
            "duration missing unit: {}",
            value
        )));
    }

    Ok(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_format() {
        let option = parse_spec("50[ip]=192.168.1.5").unwrap();
        assert_eq!(option.code, 50);
        assert_eq!(option.data, vec![0xC0, 0xA8, 0x01, 0x05]);

        let multi = parse_spec("6[ip]=8.8.8.8,1.1.1.1").unwrap();
        assert_eq!(multi.data, vec![8, 8, 8, 8, 1, 1, 1, 1]);

        assert!(parse_spec("6[ip]=not-an-ip").is_err());
    }

    #[test]
    fn test_message_format() {
        let option = parse_spec("53[message]=discover").unwrap();
        assert_eq!(option.code, 53);
        assert_eq!(option.data, vec![1]);

        let nak = parse_spec("53[message]=NAK").unwrap();
        assert_eq!(nak.data, vec![6]);

        assert!(parse_spec("53[message]=bogus").is_err());
    }

    #[test]
    fn test_string_default() {
        let option = parse_spec("60=Initech Groupware").unwrap();
        assert_eq!(option.code, 60);
        assert_eq!(option.data, b"Initech Groupware".to_vec());

        let explicit = parse_spec("12[string]=h1").unwrap();
        assert_eq!(explicit.data, b"h1".to_vec());

        let empty = parse_spec("80").unwrap();
        assert_eq!(empty.code, 80);
        assert!(empty.data.is_empty());
    }

    #[test]
    fn test_hex_format() {
        let option = parse_spec("43[hex]=deadbeef").unwrap();
        assert_eq!(option.data, vec![0xde, 0xad, 0xbe, 0xef]);

        assert!(parse_spec("43[hex]=abc").is_err());
        assert!(parse_spec("43[hex]=zz").is_err());
    }

    #[test]
    fn test_bool_format() {
        assert_eq!(parse_spec("19[bool]=true").unwrap().data, vec![1]);
        assert_eq!(parse_spec("19[bool]=0").unwrap().data, vec![0]);
        assert!(parse_spec("19[bool]=maybe").is_err());
    }

    #[test]
    fn test_option_format() {
        let by_name = parse_spec("55[option]=subnet mask,router,dns").unwrap();
        assert_eq!(by_name.code, 55);
        assert_eq!(by_name.data, vec![1, 3, 6]);

        let by_number = parse_spec("55[option]=1,3,6").unwrap();
        assert_eq!(by_number.data, vec![1, 3, 6]);

        assert!(parse_spec("55[option]=99").is_err());
        assert!(parse_spec("55[option]=frobnicator").is_err());
    }

    #[test]
    fn test_mac_format() {
        let option = parse_spec("61[mac]=aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(option.data, vec![0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);

        let two = parse_spec("61[mac]=aa:bb:cc:dd:ee:ff,02-00-00-11-22-33").unwrap();
        assert_eq!(two.data.len(), 12);

        assert!(parse_spec("61[mac]=aa:bb:cc").is_err());
    }

    #[test]
    fn test_time_format() {
        let option = parse_spec("51[time]=30s").unwrap();
        assert_eq!(option.data, 30u32.to_be_bytes().to_vec());

        let minutes = parse_spec("51[time]=10m").unwrap();
        assert_eq!(minutes.data, 600u32.to_be_bytes().to_vec());

        let mixed = parse_spec("51[time]=1h30m").unwrap();
        assert_eq!(mixed.data, 5400u32.to_be_bytes().to_vec());

        assert!(parse_spec("51[time]=90").is_err());
        assert!(parse_spec("51[time]=fast").is_err());
    }

    #[test]
    fn test_grammar_errors() {
        assert!(matches!(
            parse_spec("=value"),
            Err(Error::OptionParse(message)) if message.contains("missing option code")
        ));
        assert!(matches!(
            parse_spec("53[message=discover"),
            Err(Error::OptionParse(message)) if message.contains("unbalanced")
        ));
        assert!(matches!(
            parse_spec("53]message[=discover"),
            Err(Error::OptionParse(message)) if message.contains("unbalanced")
        ));
        assert!(matches!(
            parse_spec("53[wibble]=discover"),
            Err(Error::OptionParse(message)) if message.contains("unsupported value format")
        ));
        assert!(parse_spec("not-a-number=x").is_err());
    }

    #[test]
    fn test_grammar_roundtrip() {
        use crate::packet::DhcpPacket;

        let specs = [
            "50[ip]=192.168.1.5",
            "53[message]=discover",
            "55[option]=subnet mask,router,dns",
            "12=h1",
            "51[time]=10m",
        ];
        for spec in specs {
            let option = parse_spec(spec).unwrap();
            let mut packet = DhcpPacket::request(&[option.clone()]);
            packet.xid = 1;
            let parsed = DhcpPacket::parse(&packet.encode().unwrap()).unwrap();
            let decoded = parsed.option(option.code).unwrap();
            assert_eq!(decoded.data, option.data, "spec: {}", spec);
        }
    }

    #[test]
    fn test_parse_specs_collects_all() {
        let specs = vec!["12=h1".to_string(), "50[ip]=10.0.0.9".to_string()];
        let options = parse_specs(&specs).unwrap();
        assert_eq!(options.len(), 2);

        let bad = vec!["12=h1".to_string(), "[ip]=10.0.0.9".to_string()];
        assert!(parse_specs(&bad).is_err());
    }
}

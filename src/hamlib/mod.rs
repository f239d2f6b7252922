//! HamlibTranslator — stateless mapping between rigctl wire verbs and
//! [`RadioModel`] calls.

pub mod dump_state;

use crate::error::TranslatorError;
use crate::radio::{RadioModel, Vfo};
use tokio::io::{AsyncRead, AsyncWrite};

/// Result of dispatching one rigctl line.
pub struct DispatchOutcome {
    /// Full response text, `\n`-terminated, ready to write to the client.
    pub response: String,
    /// Set for the `q`/`Q` quit verb: the session should close after writing.
    pub close_session: bool,
}

fn ok_response(body: impl AsRef<str>) -> DispatchOutcome {
    let mut response = body.as_ref().to_string();
    if !response.ends_with('\n') {
        response.push('\n');
    }
    DispatchOutcome { response, close_session: false }
}

fn rprt(code: i32) -> DispatchOutcome {
    ok_response(format!("RPRT {code}"))
}

fn err_response(e: TranslatorError) -> DispatchOutcome {
    rprt(e.rprt_code())
}

fn parse_freq(arg: &str) -> Result<u64, TranslatorError> {
    arg.parse::<f64>()
        .map(|f| f.round() as u64)
        .map_err(|_| TranslatorError::InvalidArgument(arg.to_string()))
}

fn parse_vfo(arg: &str) -> Result<Vfo, TranslatorError> {
    match arg {
        "VFOA" | "Main" | "0" => Ok(Vfo::A),
        "VFOB" | "Sub" | "1" => Ok(Vfo::B),
        _ => Err(TranslatorError::InvalidArgument(arg.to_string())),
    }
}

fn vfo_name(vfo: Vfo) -> &'static str {
    match vfo {
        Vfo::A => "VFOA",
        Vfo::B => "VFOB",
    }
}

/// Dispatches a single rigctl protocol line against `radio` and returns the
/// response to write back. Callers are responsible for holding `rig_lock`
/// for the duration of this call (spec.md §5).
pub async fn dispatch<T>(radio: &RadioModel<T>, line: &str) -> DispatchOutcome
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let line = line.trim_end_matches(['\r', '\n']);
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return rprt(-1);
    };
    let args: Vec<&str> = parts.collect();

    if let Some(extended) = verb.strip_prefix('\\') {
        return dispatch_extended(radio, extended, &args).await;
    }

    match verb {
        "f" | "get_freq" => match radio.get_freq(Vfo::A).await {
            Ok(hz) => ok_response(hz.to_string()),
            Err(e) => err_response(e.into()),
        },
        "F" | "set_freq" => dispatch_result(set_freq(radio, &args).await),
        "m" | "get_mode" => match radio.get_mode(Vfo::A).await {
            Ok((mode, passband)) => ok_response(format!("{mode}\n{passband}")),
            Err(e) => err_response(e.into()),
        },
        "M" | "set_mode" => dispatch_result(set_mode(radio, &args).await),
        "t" | "get_ptt" => ok_response(if radio.get_ptt() { "1" } else { "0" }),
        "T" | "set_ptt" => dispatch_result(set_ptt(radio, &args).await),
        "v" | "get_vfo" => match radio.get_active_vfo().await {
            Ok(vfo) => ok_response(vfo_name(vfo)),
            Err(e) => err_response(e.into()),
        },
        "V" | "set_vfo" => dispatch_result(set_vfo(radio, &args).await),
        "s" | "get_split_vfo" => match radio.get_split().await {
            Ok(on) => ok_response(format!("{}\nVFOB", if on { 1 } else { 0 })),
            Err(e) => err_response(e.into()),
        },
        "S" | "set_split_vfo" => dispatch_result(set_split_vfo(radio, &args).await),
        "l" | "get_level" => match get_level(radio, &args).await {
            Ok(value) => ok_response(value),
            Err(e) => err_response(e),
        },
        "L" | "set_level" => dispatch_result(set_level(radio, &args).await),
        "u" | "get_func" => match get_func(radio, &args).await {
            Ok(value) => ok_response(value),
            Err(e) => err_response(e),
        },
        "U" | "set_func" => dispatch_result(set_func(radio, &args).await),
        "j" | "get_rit" => ok_response(radio.get_rit().to_string()),
        "J" | "set_rit" => dispatch_result(set_rit(radio, &args).await),
        "z" | "get_xit" => ok_response(radio.get_xit().to_string()),
        "Z" | "set_xit" => dispatch_result(set_xit(radio, &args).await),
        "w" | "send_cmd" => match send_cmd(radio, &args).await {
            Ok(reply) => ok_response(reply),
            Err(e) => err_response(e),
        },
        "_" | "get_info" => ok_response(radio.firmware_rev.clone()),
        "1" | "dump_caps" => ok_response(dump_state::dump_caps(radio.head_type)),
        // Known deviation (spec.md §9): the true tuning step is mode-dependent
        // via EX0306, which this translator does not query. A fixed 10 Hz is
        // reported instead, matching the source's behavior; `set_ts` is
        // acknowledged but has no effect on the radio.
        "n" | "get_ts" => ok_response("10"),
        "N" | "set_ts" => rprt(0),
        "q" | "Q" => DispatchOutcome { response: "RPRT 0\n".to_string(), close_session: true },
        // Verbs the radio has no matching capability for: acknowledged but
        // not available, per spec.md's NotAvailable → RPRT -11 mapping.
        // `c`/`C`/`d`/`D` are CTCSS-tone/DCS-code get/set in the real rigctl
        // verb table — not `get_ant`/`set_ant` (those sit on `a`/`A`, which
        // spec.md's verb closure excludes). The FTX-1's tone-squelch CAT
        // register isn't in spec.md's excerpted command table, so these are
        // acknowledged as not-yet-modeled rather than silently wired to a
        // guessed register.
        "e" | "get_ext_level" | "E" | "set_ext_level" | "h" | "get_powerstat"
        | "c" | "get_ctcss_tone" | "C" | "set_ctcss_tone"
        | "d" | "get_dcs_code" | "D" | "set_dcs_code" => {
            rprt(TranslatorError::NotAvailable.rprt_code())
        }
        _ => rprt(-1),
    }
}

fn dispatch_result(result: Result<(), TranslatorError>) -> DispatchOutcome {
    match result {
        Ok(()) => rprt(0),
        Err(e) => err_response(e),
    }
}

async fn set_freq<T>(radio: &RadioModel<T>, args: &[&str]) -> Result<(), TranslatorError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let arg = args.first().ok_or_else(|| TranslatorError::InvalidArgument(String::new()))?;
    let hz = parse_freq(arg)?;
    radio.set_freq(Vfo::A, hz).await?;
    Ok(())
}

async fn set_mode<T>(radio: &RadioModel<T>, args: &[&str]) -> Result<(), TranslatorError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mode = args.first().ok_or_else(|| TranslatorError::InvalidArgument(String::new()))?;
    radio
        .set_mode(Vfo::A, mode)
        .await
        .map_err(|_| TranslatorError::InvalidArgument((*mode).to_string()))?;
    Ok(())
}

async fn set_ptt<T>(radio: &RadioModel<T>, args: &[&str]) -> Result<(), TranslatorError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let arg = args.first().ok_or_else(|| TranslatorError::InvalidArgument(String::new()))?;
    let on = match *arg {
        "1" => true,
        "0" => false,
        _ => return Err(TranslatorError::InvalidArgument(arg.to_string())),
    };
    radio.set_ptt(on).await?;
    Ok(())
}

async fn set_vfo<T>(radio: &RadioModel<T>, args: &[&str]) -> Result<(), TranslatorError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let arg = args.first().ok_or_else(|| TranslatorError::InvalidArgument(String::new()))?;
    let vfo = parse_vfo(arg)?;
    radio.set_active_vfo(vfo).await?;
    Ok(())
}

async fn set_split_vfo<T>(radio: &RadioModel<T>, args: &[&str]) -> Result<(), TranslatorError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let flag = args.first().ok_or_else(|| TranslatorError::InvalidArgument(String::new()))?;
    let on = match *flag {
        "1" => true,
        "0" => false,
        _ => return Err(TranslatorError::InvalidArgument(flag.to_string())),
    };
    if let Some(vfo_arg) = args.get(1) {
        parse_vfo(vfo_arg)?;
    }
    radio.set_split(on).await?;
    Ok(())
}

async fn get_level<T>(radio: &RadioModel<T>, args: &[&str]) -> Result<String, TranslatorError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let name = args.first().ok_or_else(|| TranslatorError::InvalidArgument(String::new()))?;
    let value = radio
        .get_level(name)
        .await
        .map_err(|_| TranslatorError::InvalidArgument((*name).to_string()))?;
    Ok(format!("{value:.6}"))
}

async fn set_level<T>(radio: &RadioModel<T>, args: &[&str]) -> Result<(), TranslatorError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let name = args.first().ok_or_else(|| TranslatorError::InvalidArgument(String::new()))?;
    let value_arg = args.get(1).ok_or_else(|| TranslatorError::InvalidArgument(String::new()))?;
    let value: f64 = value_arg
        .parse()
        .map_err(|_| TranslatorError::InvalidArgument(value_arg.to_string()))?;
    radio
        .set_level(name, value)
        .await
        .map_err(|_| TranslatorError::InvalidArgument((*name).to_string()))?;
    Ok(())
}

async fn get_func<T>(radio: &RadioModel<T>, args: &[&str]) -> Result<String, TranslatorError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let name = args.first().ok_or_else(|| TranslatorError::InvalidArgument(String::new()))?;
    let value = radio.get_func(name).await.map_err(TranslatorError::from)?;
    Ok(value.to_string())
}

async fn set_func<T>(radio: &RadioModel<T>, args: &[&str]) -> Result<(), TranslatorError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let name = args.first().ok_or_else(|| TranslatorError::InvalidArgument(String::new()))?;
    let flag = args.get(1).ok_or_else(|| TranslatorError::InvalidArgument(String::new()))?;
    let on = match *flag {
        "1" => true,
        "0" => false,
        _ => return Err(TranslatorError::InvalidArgument(flag.to_string())),
    };
    radio.set_func(name, on).await.map_err(TranslatorError::from)?;
    Ok(())
}

async fn set_rit<T>(radio: &RadioModel<T>, args: &[&str]) -> Result<(), TranslatorError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let arg = args.first().ok_or_else(|| TranslatorError::InvalidArgument(String::new()))?;
    let offset: i32 = arg.parse().map_err(|_| TranslatorError::InvalidArgument(arg.to_string()))?;
    radio.set_rit(offset).await?;
    Ok(())
}

async fn set_xit<T>(radio: &RadioModel<T>, args: &[&str]) -> Result<(), TranslatorError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let arg = args.first().ok_or_else(|| TranslatorError::InvalidArgument(String::new()))?;
    let offset: i32 = arg.parse().map_err(|_| TranslatorError::InvalidArgument(arg.to_string()))?;
    radio.set_xit(offset).await?;
    Ok(())
}

/// `\set_split_freq_mode <freq> <mode> [width]`: split transmit goes out on
/// VFO-B, so both the frequency and the mode land there, not on VFO-A.
async fn set_split_freq_mode<T>(radio: &RadioModel<T>, args: &[&str]) -> Result<(), TranslatorError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let freq_arg = args.first().ok_or_else(|| TranslatorError::InvalidArgument(String::new()))?;
    let mode_arg = args.get(1).ok_or_else(|| TranslatorError::InvalidArgument(String::new()))?;
    let hz = parse_freq(freq_arg)?;
    radio.set_freq(Vfo::B, hz).await?;
    radio
        .set_mode(Vfo::B, mode_arg)
        .await
        .map_err(|_| TranslatorError::InvalidArgument((*mode_arg).to_string()))?;
    Ok(())
}

/// `w`/`send_cmd`: strips a trailing `;` from raw CAT arguments before
/// forwarding, and restores the `\n` line terminator on the reply.
async fn send_cmd<T>(radio: &RadioModel<T>, args: &[&str]) -> Result<String, TranslatorError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let raw = args.join(" ");
    let stripped = raw.trim_end_matches(';');
    if stripped.is_empty() {
        return Err(TranslatorError::InvalidArgument(raw));
    }
    radio.send_raw(stripped).await.map_err(TranslatorError::from)
}

async fn dispatch_extended<T>(
    radio: &RadioModel<T>,
    extended_verb: &str,
    args: &[&str],
) -> DispatchOutcome
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    match extended_verb {
        "dump_state" => ok_response(dump_state::dump_state(radio.head_type)),
        "dump_caps" => ok_response(dump_state::dump_caps(radio.head_type)),
        "get_vfo_info" => dispatch_get_vfo_info(radio, args).await,
        "halt" | "pause" | "resume" => rprt(0),
        "send_morse" => rprt(TranslatorError::NotAvailable.rprt_code()),
        "set_split_freq_mode" => dispatch_result(set_split_freq_mode(radio, args).await),
        _ => rprt(-1),
    }
}

async fn dispatch_get_vfo_info<T>(radio: &RadioModel<T>, args: &[&str]) -> DispatchOutcome
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let vfo = match args.first().map(|a| parse_vfo(a)) {
        Some(Ok(v)) => v,
        Some(Err(e)) => return err_response(e),
        None => Vfo::A,
    };

    let (freq, mode) = match (radio.get_freq(vfo).await, radio.get_mode(vfo).await) {
        (Ok(f), Ok((m, _))) => (f, m),
        (Err(e), _) | (_, Err(e)) => return err_response(e.into()),
    };
    let split = match radio.get_split().await {
        Ok(on) => on,
        Err(e) => return err_response(e.into()),
    };

    ok_response(format!(
        "Freq: {freq}\nMode: {mode}\nWidth: 0\nSplit: {}\nSatMode: 0\n",
        if split { "on" } else { "off" }
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::HeadType;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn model(head_type: HeadType) -> (RadioModel<DuplexStream>, DuplexStream) {
        let (client, server) = tokio::io::duplex(4096);
        let cat = crate::cat::CatLink::new(client, Duration::from_millis(200));
        (RadioModel::new(cat, head_type, "0840".to_string()), server)
    }

    #[tokio::test]
    async fn set_freq_then_get_freq_round_trips() {
        let (radio, mut server) = model(HeadType::Spa1);

        let set_handle = tokio::spawn(async move { dispatch(&radio, "F 14074000").await });
        let mut buf = vec![0u8; "FA014074000;".len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"FA014074000;");
        let outcome = set_handle.await.unwrap();
        assert_eq!(outcome.response, "RPRT 0\n");
    }

    #[tokio::test]
    async fn empty_line_is_einval() {
        let (radio, _server) = model(HeadType::Spa1);
        let outcome = dispatch(&radio, "").await;
        assert_eq!(outcome.response, "RPRT -1\n");
    }

    #[tokio::test]
    async fn unknown_level_is_einval() {
        let (radio, _server) = model(HeadType::Spa1);
        let outcome = dispatch(&radio, "l INVALID").await;
        assert_eq!(outcome.response, "RPRT -1\n");
    }

    #[tokio::test]
    async fn tuner_on_field_head_is_enavail() {
        let (radio, _server) = model(HeadType::Field12V);
        let outcome = dispatch(&radio, "u TUNER").await;
        assert_eq!(outcome.response, "RPRT -11\n");
    }

    #[tokio::test]
    async fn raw_cat_rejection_is_eproto() {
        let (radio, mut server) = model(HeadType::Spa1);
        let handle = tokio::spawn(async move { dispatch(&radio, "w RT+10").await });
        let mut buf = vec![0u8; "RT+10;".len()];
        server.read_exact(&mut buf).await.unwrap();
        server.write_all(b"?;").await.unwrap();
        server.flush().await.unwrap();
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.response, "RPRT -2\n");
    }

    #[tokio::test]
    async fn dump_state_verb_returns_fixed_block() {
        let (radio, _server) = model(HeadType::Spa1);
        let outcome = dispatch(&radio, "\\dump_state").await;
        assert!(outcome.response.starts_with("0\n1051\n0\n"));
    }

    #[tokio::test]
    async fn get_ts_returns_fixed_ten_hz() {
        let (radio, _server) = model(HeadType::Spa1);
        let outcome = dispatch(&radio, "n").await;
        assert_eq!(outcome.response, "10\n");
    }

    #[tokio::test]
    async fn quit_verb_closes_session() {
        let (radio, _server) = model(HeadType::Spa1);
        let outcome = dispatch(&radio, "q").await;
        assert!(outcome.close_session);
    }

    #[tokio::test]
    async fn set_rit_then_get_rit_round_trips() {
        let (radio, mut server) = model(HeadType::Spa1);
        let set_handle = tokio::spawn(async move {
            let outcome = dispatch(&radio, "J 500").await;
            (radio, outcome)
        });
        let mut buf = vec![0u8; "RC+0500;".len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"RC+0500;");
        let (radio, outcome) = set_handle.await.unwrap();
        assert_eq!(outcome.response, "RPRT 0\n");

        let get_outcome = dispatch(&radio, "j").await;
        assert_eq!(get_outcome.response, "500\n");
    }

    #[tokio::test]
    async fn set_xit_then_get_xit_round_trips() {
        let (radio, mut server) = model(HeadType::Spa1);
        let set_handle = tokio::spawn(async move {
            let outcome = dispatch(&radio, "Z -250").await;
            (radio, outcome)
        });
        let mut buf = vec![0u8; "TC-0250;".len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"TC-0250;");
        let (radio, outcome) = set_handle.await.unwrap();
        assert_eq!(outcome.response, "RPRT 0\n");

        let get_outcome = dispatch(&radio, "z").await;
        assert_eq!(get_outcome.response, "-250\n");
    }

    #[tokio::test]
    async fn set_ptt_then_get_ptt_round_trips() {
        let (radio, mut server) = model(HeadType::Spa1);
        let set_handle = tokio::spawn(async move {
            let outcome = dispatch(&radio, "T 1").await;
            (radio, outcome)
        });
        let mut buf = vec![0u8; "TX1;".len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"TX1;");
        let (radio, outcome) = set_handle.await.unwrap();
        assert_eq!(outcome.response, "RPRT 0\n");

        let get_outcome = dispatch(&radio, "t").await;
        assert_eq!(get_outcome.response, "1\n");
    }

    #[tokio::test]
    async fn set_split_freq_mode_targets_vfo_b() {
        let (radio, mut server) = model(HeadType::Spa1);
        let handle =
            tokio::spawn(async move { dispatch(&radio, "\\set_split_freq_mode 7074000 PKTUSB").await });

        let mut freq_buf = vec![0u8; "FB007074000;".len()];
        server.read_exact(&mut freq_buf).await.unwrap();
        assert_eq!(&freq_buf, b"FB007074000;");

        let mut mode_buf = vec![0u8; "MD1C;".len()];
        server.read_exact(&mut mode_buf).await.unwrap();
        assert_eq!(&mode_buf, b"MD1C;");

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.response, "RPRT 0\n");
    }
}

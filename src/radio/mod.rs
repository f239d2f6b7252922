//! RadioModel — typed facade over [`CatLink`](crate::cat::CatLink) exposing
//! frequency/mode/PTT/split/level/function/RIT-XIT operations, plus
//! head-type detection at connect.

pub mod levels;
pub mod mode;

use crate::cat::CatLink;
use crate::error::RadioError;
use levels::{function_descriptor, level_descriptor, ScaleKind};
use tokio::io::{AsyncRead, AsyncWrite};

/// VFO selector. The radio exposes two: MAIN (VFO-A) and SUB (VFO-B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vfo {
    A,
    B,
}

/// Physical head configuration, discovered once at connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadType {
    Field12V,
    FieldBattery,
    Spa1,
}

impl HeadType {
    pub fn is_spa1(self) -> bool {
        matches!(self, HeadType::Spa1)
    }

    /// Max power in watts for the detected head/power-source combination.
    pub fn max_power_watts(self) -> u32 {
        match self {
            HeadType::Field12V => 10,
            HeadType::FieldBattery => 6,
            HeadType::Spa1 => 100,
        }
    }
}

/// Typed radio API. Owns the serial link exclusively; callers serialize
/// access externally via `rig_lock` (spec.md §5) — this type has no
/// internal locking of its own beyond what `CatLink` already provides.
pub struct RadioModel<T> {
    pub(crate) cat: CatLink<T>,
    pub head_type: HeadType,
    pub firmware_rev: String,
    /// Last offset written via `set_rit`/`set_xit`. The radio has no CAT
    /// query for the current RIT/XIT offset, so `get_rit`/`get_xit` serve
    /// this cached value back rather than re-asking the radio (spec.md §8:
    /// `J 500` then `j` must yield `500`).
    rit_offset: std::sync::atomic::AtomicI32,
    xit_offset: std::sync::atomic::AtomicI32,
    /// Last PTT state written via `set_ptt`, served back by `get_ptt` for
    /// the same reason (`TX;` has no query form on this radio).
    ptt: std::sync::atomic::AtomicBool,
}

impl<T> RadioModel<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub(crate) fn new(cat: CatLink<T>, head_type: HeadType, firmware_rev: String) -> Self {
        Self {
            cat,
            head_type,
            firmware_rev,
            rit_offset: std::sync::atomic::AtomicI32::new(0),
            xit_offset: std::sync::atomic::AtomicI32::new(0),
            ptt: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Runs head-type detection and returns a ready `RadioModel`.
    pub async fn connect(cat: CatLink<T>) -> Result<Self, RadioError> {
        let id_frame = cat
            .send_command("ID", "", true)
            .await?
            .ok_or(RadioError::ProbeFailed)?;
        let firmware_rev = id_frame.payload;

        let pc_frame = cat
            .send_command("PC", "", true)
            .await?
            .ok_or(RadioError::ProbeFailed)?;
        let first_digit = pc_frame
            .payload
            .chars()
            .next()
            .ok_or(RadioError::ProbeFailed)?;

        // The first payload digit is a head-type flag; the remainder is the
        // current power setting in the same format `set_power_watts` writes.
        let current_power = pc_frame.payload.get(1..).unwrap_or("").to_string();

        let head_type = match first_digit {
            '2' => HeadType::Spa1,
            '1' => {
                let probe = cat.send_command("PC", "10.8", true).await;
                let detected = match probe {
                    Ok(_) => HeadType::Field12V,
                    Err(_) => HeadType::FieldBattery,
                };
                cat.send_command("PC", &current_power, false).await?;
                detected
            }
            _ => return Err(RadioError::ProbeFailed),
        };

        Ok(Self::new(cat, head_type, firmware_rev))
    }

    fn freq_code(vfo: Vfo) -> &'static str {
        match vfo {
            Vfo::A => "FA",
            Vfo::B => "FB",
        }
    }

    pub async fn get_freq(&self, vfo: Vfo) -> Result<u64, RadioError> {
        let frame = self
            .cat
            .send_command(Self::freq_code(vfo), "", true)
            .await?
            .ok_or(RadioError::ProbeFailed)?;
        frame
            .payload
            .parse::<u64>()
            .map_err(|_| RadioError::Cat(crate::error::CatError::MalformedFrame))
    }

    pub async fn set_freq(&self, vfo: Vfo, hz: u64) -> Result<(), RadioError> {
        let payload = format!("{hz:09}");
        self.cat
            .send_command(Self::freq_code(vfo), &payload, false)
            .await?;
        Ok(())
    }

    pub async fn get_mode(&self, vfo: Vfo) -> Result<(String, u32), RadioError> {
        let vfo_digit = match vfo {
            Vfo::A => '0',
            Vfo::B => '1',
        };
        let frame = self
            .cat
            .send_command("MD", &vfo_digit.to_string(), true)
            .await?
            .ok_or(RadioError::ProbeFailed)?;
        let mode_char = frame.payload.chars().next().ok_or(RadioError::ProbeFailed)?;
        let hamlib = mode::hamlib_for_cat_char(mode_char).ok_or(RadioError::ProbeFailed)?;
        Ok((hamlib.to_string(), 0))
    }

    pub async fn set_mode(&self, vfo: Vfo, hamlib_mode: &str) -> Result<(), RadioError> {
        let cat_char = mode::cat_char_for_hamlib(hamlib_mode)
            .ok_or(RadioError::NotAvailable("mode"))?;
        let vfo_digit = match vfo {
            Vfo::A => '0',
            Vfo::B => '1',
        };
        let payload = format!("{vfo_digit}{cat_char}");
        self.cat.send_command("MD", &payload, false).await?;
        Ok(())
    }

    pub async fn set_ptt(&self, on: bool) -> Result<(), RadioError> {
        self.cat
            .send_command("TX", if on { "1" } else { "0" }, false)
            .await?;
        self.ptt.store(on, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    /// Returns the last PTT state written via `set_ptt`; the radio has no
    /// `TX` query form, so this serves the cached value (spec.md §8).
    pub fn get_ptt(&self) -> bool {
        self.ptt.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub async fn set_active_vfo(&self, vfo: Vfo) -> Result<(), RadioError> {
        let digit = match vfo {
            Vfo::A => "0",
            Vfo::B => "1",
        };
        self.cat.send_command("VS", digit, false).await?;
        Ok(())
    }

    pub async fn get_active_vfo(&self) -> Result<Vfo, RadioError> {
        let frame = self
            .cat
            .send_command("VS", "", true)
            .await?
            .ok_or(RadioError::ProbeFailed)?;
        match frame.payload.chars().next() {
            Some('0') => Ok(Vfo::A),
            Some('1') => Ok(Vfo::B),
            _ => Err(RadioError::Cat(crate::error::CatError::MalformedFrame)),
        }
    }

    pub async fn set_split(&self, on: bool) -> Result<(), RadioError> {
        self.cat
            .send_command("ST", if on { "1" } else { "0" }, false)
            .await?;
        Ok(())
    }

    pub async fn get_split(&self) -> Result<bool, RadioError> {
        let frame = self
            .cat
            .send_command("ST", "", true)
            .await?
            .ok_or(RadioError::ProbeFailed)?;
        Ok(frame.payload.starts_with('1'))
    }

    /// `Field` formats watts as a one-decimal fraction (`PC5.5;`); `SPA-1`
    /// formats as a bare integer.
    pub async fn set_power_watts(&self, watts: f32) -> Result<(), RadioError> {
        let payload = if self.head_type.is_spa1() {
            format!("{:.0}", watts)
        } else {
            format!("{:.1}", watts)
        };
        self.cat.send_command("PC", &payload, false).await?;
        Ok(())
    }

    pub async fn get_power_watts(&self) -> Result<f32, RadioError> {
        let frame = self
            .cat
            .send_command("PC", "", true)
            .await?
            .ok_or(RadioError::ProbeFailed)?;
        frame
            .payload
            .parse::<f32>()
            .map_err(|_| RadioError::Cat(crate::error::CatError::MalformedFrame))
    }

    /// Sets the RIT offset in Hz via `RC` (not `RT`, which this firmware rejects).
    pub async fn set_rit(&self, offset_hz: i32) -> Result<(), RadioError> {
        let payload = format!("{offset_hz:+05}");
        self.cat.send_command("RC", &payload, false).await?;
        self.rit_offset
            .store(offset_hz, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    /// Returns the last RIT offset written via `set_rit`; the radio has no
    /// `RC` query form, so this serves the cached value (spec.md §8).
    pub fn get_rit(&self) -> i32 {
        self.rit_offset.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Sets the XIT offset in Hz via `TC` (not `XT`, which this firmware rejects).
    pub async fn set_xit(&self, offset_hz: i32) -> Result<(), RadioError> {
        let payload = format!("{offset_hz:+05}");
        self.cat.send_command("TC", &payload, false).await?;
        self.xit_offset
            .store(offset_hz, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    /// Returns the last XIT offset written via `set_xit`; the radio has no
    /// `TC` query form, so this serves the cached value (spec.md §8).
    pub fn get_xit(&self) -> i32 {
        self.xit_offset.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub async fn set_agc(&self, vfo: Vfo, level: u8) -> Result<(), RadioError> {
        let vfo_digit = match vfo {
            Vfo::A => '0',
            Vfo::B => '1',
        };
        let payload = format!("{vfo_digit}{level}");
        self.cat.send_command("GT", &payload, false).await?;
        Ok(())
    }

    pub async fn get_meter(&self, index: u8) -> Result<i32, RadioError> {
        let payload = index.to_string();
        let frame = self
            .cat
            .send_command("RM", &payload, true)
            .await?
            .ok_or(RadioError::ProbeFailed)?;
        frame
            .payload
            .get(1..)
            .ok_or(RadioError::Cat(crate::error::CatError::MalformedFrame))?
            .parse::<i32>()
            .map_err(|_| RadioError::Cat(crate::error::CatError::MalformedFrame))
    }

    pub async fn get_s_meter(&self, vfo: Vfo) -> Result<u8, RadioError> {
        let vfo_digit = match vfo {
            Vfo::A => '0',
            Vfo::B => '1',
        };
        let frame = self
            .cat
            .send_command("SM", &vfo_digit.to_string(), true)
            .await?
            .ok_or(RadioError::ProbeFailed)?;
        frame
            .payload
            .get(1..)
            .ok_or(RadioError::Cat(crate::error::CatError::MalformedFrame))?
            .parse::<u8>()
            .map_err(|_| RadioError::Cat(crate::error::CatError::MalformedFrame))
    }

    /// Reads a level, normalizing per its [`ScaleKind`]. `STRENGTH`/`SWR`/
    /// `ALC`/`COMP` read via the meter commands rather than a settable register.
    pub async fn get_level(&self, hamlib_name: &str) -> Result<f64, RadioError> {
        let descriptor =
            level_descriptor(hamlib_name).ok_or(RadioError::NotAvailable("level"))?;
        if !descriptor.has_get {
            return Err(RadioError::NotAvailable("level"));
        }

        let raw: i32 = if hamlib_name == "STRENGTH" {
            self.get_s_meter(Vfo::A).await? as i32
        } else if let Some(rest) = descriptor.cat_command.strip_prefix("RM") {
            let index: u8 = rest.parse().expect("static table entries are well formed");
            self.get_meter(index).await?
        } else {
            let frame = self
                .cat
                .send_command(descriptor.cat_command, "", true)
                .await?
                .ok_or(RadioError::ProbeFailed)?;
            frame
                .payload
                .parse::<i32>()
                .map_err(|_| RadioError::Cat(crate::error::CatError::MalformedFrame))?
        };

        Ok(match descriptor.scale {
            ScaleKind::Normalized { device_min, device_max } => {
                (raw - device_min) as f64 / (device_max - device_min) as f64
            }
            ScaleKind::Absolute | ScaleKind::Enumerated(_) => raw as f64,
        })
    }

    /// Sets a level, denormalizing per its [`ScaleKind`] and rounding to the
    /// device's integer granularity.
    pub async fn set_level(&self, hamlib_name: &str, value: f64) -> Result<(), RadioError> {
        let descriptor =
            level_descriptor(hamlib_name).ok_or(RadioError::NotAvailable("level"))?;
        if !descriptor.has_set {
            return Err(RadioError::NotAvailable("level"));
        }

        let raw = match descriptor.scale {
            ScaleKind::Normalized { device_min, device_max } => {
                let span = (device_max - device_min) as f64;
                (value * span).round() as i32 + device_min
            }
            ScaleKind::Absolute => value.round() as i32,
            ScaleKind::Enumerated(allowed) => {
                let target = value.round() as i32;
                *allowed
                    .iter()
                    .min_by_key(|v| (**v - target).abs())
                    .expect("enumerated scale has at least one value")
            }
        };

        self.cat
            .send_command(descriptor.cat_command, &raw.to_string(), false)
            .await?;
        Ok(())
    }

    /// Reads a function's state. Functions with a sentinel (`NB`, `MON`)
    /// always report that fixed value rather than a true boolean.
    pub async fn get_func(&self, hamlib_name: &str) -> Result<i32, RadioError> {
        let descriptor =
            function_descriptor(hamlib_name).ok_or(RadioError::NotAvailable("function"))?;
        if descriptor.spa1_only && !self.head_type.is_spa1() {
            return Err(RadioError::NotAvailable("function"));
        }
        if let Some(sentinel) = descriptor.sentinel {
            return Ok(sentinel);
        }
        let frame = self
            .cat
            .send_command(descriptor.cat_command, "", true)
            .await?
            .ok_or(RadioError::ProbeFailed)?;
        frame
            .payload
            .chars()
            .next()
            .and_then(|c| c.to_digit(10))
            .map(|d| d as i32)
            .ok_or(RadioError::Cat(crate::error::CatError::MalformedFrame))
    }

    /// Sets a function's state. Sentinel functions accept a boolean but
    /// write the sentinel (or `0`) to the underlying device register.
    pub async fn set_func(&self, hamlib_name: &str, on: bool) -> Result<(), RadioError> {
        let descriptor =
            function_descriptor(hamlib_name).ok_or(RadioError::NotAvailable("function"))?;
        if descriptor.spa1_only && !self.head_type.is_spa1() {
            return Err(RadioError::NotAvailable("function"));
        }
        let payload = match descriptor.sentinel {
            Some(sentinel) if on => sentinel.to_string(),
            Some(_) => "0".to_string(),
            None => if on { "1" } else { "0" }.to_string(),
        };
        self.cat
            .send_command(descriptor.cat_command, &payload, false)
            .await?;
        Ok(())
    }

    /// Raw CAT passthrough for the rigctl `w` / `send_cmd` verb.
    pub async fn send_raw(&self, text: &str) -> Result<String, RadioError> {
        Ok(self.cat.send_raw(text).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn link() -> (CatLink<DuplexStream>, DuplexStream) {
        let (client, server) = tokio::io::duplex(4096);
        (CatLink::new(client, Duration::from_millis(200)), server)
    }

    async fn respond(server: &mut DuplexStream, expect_len: usize, reply: &[u8]) {
        let mut buf = vec![0u8; expect_len];
        server.read_exact(&mut buf).await.unwrap();
        server.write_all(reply).await.unwrap();
        server.flush().await.unwrap();
    }

    #[tokio::test]
    async fn connect_detects_field_12v() {
        let (cat, mut server) = link();
        let handle = tokio::spawn(async move { RadioModel::connect(cat).await });

        respond(&mut server, "ID;".len(), b"ID0840;").await;
        respond(&mut server, "PC;".len(), b"PC15.0;").await;
        respond(&mut server, "PC10.8;".len(), b"PC10.8;").await;

        let mut restore_buf = vec![0u8; "PC5.0;".len()];
        server.read_exact(&mut restore_buf).await.unwrap();
        assert_eq!(&restore_buf, b"PC5.0;");

        let model = handle.await.unwrap().unwrap();
        assert_eq!(model.head_type, HeadType::Field12V);
    }

    #[tokio::test]
    async fn connect_detects_spa1() {
        let (cat, mut server) = link();
        let handle = tokio::spawn(async move { RadioModel::connect(cat).await });

        respond(&mut server, "ID;".len(), b"ID0840;").await;
        respond(&mut server, "PC;".len(), b"PC2100;").await;

        let model = handle.await.unwrap().unwrap();
        assert_eq!(model.head_type, HeadType::Spa1);
    }

    #[tokio::test]
    async fn set_get_freq_round_trips_over_mock() {
        let (cat, mut server) = link();
        let model = RadioModel::new(cat, HeadType::Spa1, String::new());

        let handle = tokio::spawn(async move { model.set_freq(Vfo::A, 14_074_000).await });
        let mut buf = vec![0u8; "FA014074000;".len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"FA014074000;");
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn set_mode_uses_canonical_cat_char() {
        let (cat, mut server) = link();
        let model = RadioModel::new(cat, HeadType::Spa1, String::new());

        let handle = tokio::spawn(async move { model.set_mode(Vfo::A, "PKTUSB").await });
        let mut buf = vec![0u8; "MD0C;".len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"MD0C;");
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn get_level_normalizes_rfpower() {
        let (cat, mut server) = link();
        let model = RadioModel::new(cat, HeadType::Spa1, String::new());

        let handle = tokio::spawn(async move { model.get_level("RFPOWER").await });
        respond(&mut server, "PC;".len(), b"PC50;").await;
        let value = handle.await.unwrap().unwrap();
        assert!((value - 0.5).abs() < 0.01);
    }

    #[tokio::test]
    async fn set_level_enumerated_snaps_to_nearest() {
        let (cat, mut server) = link();
        let model = RadioModel::new(cat, HeadType::Spa1, String::new());

        let handle = tokio::spawn(async move { model.set_level("ATT", 7.0).await });
        let mut buf = vec![0u8; "RA12;".len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"RA12;");
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unknown_level_is_not_available() {
        let (cat, _server) = link();
        let model = RadioModel::new(cat, HeadType::Spa1, String::new());
        let result = model.get_level("BOGUS").await;
        assert!(matches!(result, Err(RadioError::NotAvailable(_))));
    }

    #[tokio::test]
    async fn get_meter_on_short_reply_is_malformed_not_a_panic() {
        let (cat, mut server) = link();
        let model = RadioModel::new(cat, HeadType::Spa1, String::new());

        let handle = tokio::spawn(async move { model.get_meter(5).await });
        // A well-formed reply echoes the index digit before the value
        // (e.g. "RM55;" for index 5, value 5); this one has no payload at
        // all, which used to panic on `frame.payload[1..]`.
        respond(&mut server, "RM5;".len(), b"RM;").await;
        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(RadioError::Cat(crate::error::CatError::MalformedFrame))
        ));
    }

    #[tokio::test]
    async fn get_s_meter_on_short_reply_is_malformed_not_a_panic() {
        let (cat, mut server) = link();
        let model = RadioModel::new(cat, HeadType::Spa1, String::new());

        let handle = tokio::spawn(async move { model.get_s_meter(Vfo::A).await });
        respond(&mut server, "SM0;".len(), b"SM;").await;
        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(RadioError::Cat(crate::error::CatError::MalformedFrame))
        ));
    }
}

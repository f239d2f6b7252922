//! Fixed `\dump_state` / `\dump_caps` structural blocks.
//!
//! The values here are mostly constant across head types; only the TX power
//! ceiling varies with the detected head (spec.md §4.3).

use crate::radio::HeadType;

const MODES_BITMASK: &str = "0x3ffff";

/// Assembles the full `\dump_state` response for `HamlibTranslator`.
pub fn dump_state(head_type: HeadType) -> String {
    let tx_max_mw = head_type.max_power_watts() as u64 * 1000;
    let mut out = String::new();

    out.push_str("0\n1051\n0\n");

    // RX range: 30 kHz .. 60 MHz, list terminated by an all-zero line.
    out.push_str(&format!("30000 60000000 {MODES_BITMASK} -1 -1 0 0\n"));
    out.push_str("0 0 0 0 0 0 0\n");

    // TX range: head-type-dependent power ceiling in milliwatts.
    out.push_str(&format!(
        "1800000 54000000 {MODES_BITMASK} 0 {tx_max_mw} 0 0\n"
    ));
    out.push_str("0 0 0 0 0 0 0\n");

    // Tuning steps.
    out.push_str(&format!("10 {MODES_BITMASK}\n"));
    out.push_str(&format!("100 {MODES_BITMASK}\n"));
    out.push_str("0 0\n");

    // Filters.
    out.push_str("2400 0x2\n");
    out.push_str("500 0x20\n");
    out.push_str("0 0\n");

    // max_rit, max_xit, max_ifshift.
    out.push_str("9999\n9999\n0\n");

    // announces, preamp-list terminator, attenuator-list terminator.
    out.push_str("0\n0\n0\n");

    // has_get_func, has_set_func, has_get_level, has_set_level.
    out.push_str("0xffffffff\n");
    out.push_str("0xffffffff\n");
    out.push_str("0xfffffffffffffff\n");
    out.push_str("0xfffffffffffffff\n");

    // has_get_parm, has_set_parm.
    out.push_str("0\n0\n");

    out
}

/// Assembles the `1` / `\dump_caps` key=value response.
pub fn dump_caps(head_type: HeadType) -> String {
    let model_name = match head_type {
        HeadType::Spa1 => "FTX-1 Optima/SPA-1",
        HeadType::Field12V => "FTX-1 Field (12V)",
        HeadType::FieldBattery => "FTX-1 Field (battery)",
    };
    let max_power = head_type.max_power_watts();

    format!(
        "Model name:\t{model_name}\n\
         Mfg name:\tYaesu\n\
         Backend version:\t1051\n\
         Rig type:\tTransceiver\n\
         PTT type:\tRig capable\n\
         DCD type:\tRig capable\n\
         Port type:\tSerial\n\
         Serial speed:\t38400\n\
         Has Get Power W:\tY\n\
         Max RF Power:\t{max_power}\n\
         Done\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_state_starts_with_protocol_header() {
        let out = dump_state(HeadType::Spa1);
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("0"));
        assert_eq!(lines.next(), Some("1051"));
        assert_eq!(lines.next(), Some("0"));
    }

    #[test]
    fn dump_state_tx_power_tracks_head_type() {
        let field = dump_state(HeadType::FieldBattery);
        assert!(field.contains(" 6000 0 0\n"));
        let spa1 = dump_state(HeadType::Spa1);
        assert!(spa1.contains(" 100000 0 0\n"));
    }

    #[test]
    fn dump_state_ends_with_parm_bitmask_lines() {
        let out = dump_state(HeadType::Spa1);
        assert!(out.ends_with("0\n0\n"));
    }

    #[test]
    fn dump_caps_names_the_model_and_ends_with_done() {
        let out = dump_caps(HeadType::Field12V);
        assert!(out.contains("FTX-1 Field (12V)"));
        assert!(out.ends_with("Done\n"));
    }
}

//! Level and function taxonomies, enumerated rather than left as raw
//! strings past the rigctl parse boundary (spec.md §9).

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleKind {
    /// `[0.0, 1.0]` on the Hamlib side, linearly mapped to a device range.
    Normalized { device_min: i32, device_max: i32 },
    /// Passed through as-is (dB, ratio×10, WPM, device units).
    Absolute,
    /// A fixed set of device values (e.g. ATT 0/12, PREAMP 0/10/20).
    Enumerated(&'static [i32]),
}

#[derive(Debug, Clone, Copy)]
pub struct LevelDescriptor {
    pub hamlib: &'static str,
    pub cat_command: &'static str,
    pub scale: ScaleKind,
    pub has_get: bool,
    pub has_set: bool,
}

pub const LEVEL_TABLE: &[LevelDescriptor] = &[
    LevelDescriptor {
        hamlib: "RFPOWER",
        cat_command: "PC",
        scale: ScaleKind::Normalized { device_min: 0, device_max: 100 },
        has_get: true,
        has_set: true,
    },
    LevelDescriptor {
        hamlib: "AF",
        cat_command: "AG",
        scale: ScaleKind::Normalized { device_min: 0, device_max: 255 },
        has_get: true,
        has_set: true,
    },
    LevelDescriptor {
        hamlib: "RF",
        cat_command: "RG",
        scale: ScaleKind::Normalized { device_min: 0, device_max: 255 },
        has_get: true,
        has_set: true,
    },
    LevelDescriptor {
        hamlib: "SQL",
        cat_command: "SQ",
        scale: ScaleKind::Normalized { device_min: 0, device_max: 255 },
        has_get: true,
        has_set: true,
    },
    LevelDescriptor {
        hamlib: "MICGAIN",
        cat_command: "MG",
        scale: ScaleKind::Normalized { device_min: 0, device_max: 100 },
        has_get: true,
        has_set: true,
    },
    LevelDescriptor {
        hamlib: "VOXGAIN",
        cat_command: "VG",
        scale: ScaleKind::Normalized { device_min: 0, device_max: 100 },
        has_get: true,
        has_set: true,
    },
    LevelDescriptor {
        hamlib: "NR",
        cat_command: "RL",
        scale: ScaleKind::Normalized { device_min: 1, device_max: 15 },
        has_get: true,
        has_set: true,
    },
    LevelDescriptor {
        hamlib: "MONITOR_GAIN",
        cat_command: "ML",
        scale: ScaleKind::Normalized { device_min: 0, device_max: 100 },
        has_get: true,
        has_set: true,
    },
    LevelDescriptor {
        hamlib: "STRENGTH",
        cat_command: "SM",
        scale: ScaleKind::Absolute,
        has_get: true,
        has_set: false,
    },
    LevelDescriptor {
        hamlib: "SWR",
        cat_command: "RM1",
        scale: ScaleKind::Absolute,
        has_get: true,
        has_set: false,
    },
    LevelDescriptor {
        hamlib: "ALC",
        cat_command: "RM2",
        scale: ScaleKind::Absolute,
        has_get: true,
        has_set: false,
    },
    LevelDescriptor {
        hamlib: "COMP",
        cat_command: "RM3",
        scale: ScaleKind::Absolute,
        has_get: true,
        has_set: false,
    },
    LevelDescriptor {
        hamlib: "KEYSPD",
        cat_command: "KS",
        scale: ScaleKind::Absolute,
        has_get: true,
        has_set: true,
    },
    LevelDescriptor {
        hamlib: "VOXDELAY",
        cat_command: "VD",
        scale: ScaleKind::Absolute,
        has_get: true,
        has_set: true,
    },
    LevelDescriptor {
        hamlib: "BKINDL",
        cat_command: "SD",
        scale: ScaleKind::Absolute,
        has_get: true,
        has_set: true,
    },
    LevelDescriptor {
        hamlib: "NOTCHF",
        cat_command: "BP",
        scale: ScaleKind::Absolute,
        has_get: true,
        has_set: true,
    },
    LevelDescriptor {
        hamlib: "AGC",
        cat_command: "GT",
        scale: ScaleKind::Enumerated(&[0, 1, 2, 3, 4]),
        has_get: true,
        has_set: true,
    },
    LevelDescriptor {
        hamlib: "ATT",
        cat_command: "RA",
        scale: ScaleKind::Enumerated(&[0, 12]),
        has_get: true,
        has_set: true,
    },
    LevelDescriptor {
        hamlib: "PREAMP",
        cat_command: "PA",
        scale: ScaleKind::Enumerated(&[0, 10, 20]),
        has_get: true,
        has_set: true,
    },
];

pub fn level_descriptor(hamlib_name: &str) -> Option<&'static LevelDescriptor> {
    LEVEL_TABLE.iter().find(|d| d.hamlib == hamlib_name)
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionDescriptor {
    pub hamlib: &'static str,
    pub cat_command: &'static str,
    /// Present when this function has no clean 0/1 semantics: `get_func`
    /// reports this fixed value instead of a true boolean (spec.md §4.3).
    pub sentinel: Option<i32>,
    /// `true` if only the SPA-1/Optima head supports this function.
    pub spa1_only: bool,
}

pub const FUNCTION_TABLE: &[FunctionDescriptor] = &[
    FunctionDescriptor { hamlib: "NB", cat_command: "NB", sentinel: Some(8), spa1_only: false },
    FunctionDescriptor { hamlib: "MON", cat_command: "ML", sentinel: Some(50), spa1_only: false },
    FunctionDescriptor { hamlib: "VOX", cat_command: "VX", sentinel: None, spa1_only: false },
    FunctionDescriptor { hamlib: "NR", cat_command: "NR", sentinel: None, spa1_only: false },
    FunctionDescriptor { hamlib: "LOCK", cat_command: "LK", sentinel: None, spa1_only: false },
    FunctionDescriptor { hamlib: "COMP", cat_command: "PR", sentinel: None, spa1_only: false },
    FunctionDescriptor { hamlib: "TUNER", cat_command: "AC", sentinel: None, spa1_only: true },
];

pub fn function_descriptor(hamlib_name: &str) -> Option<&'static FunctionDescriptor> {
    FUNCTION_TABLE.iter().find(|d| d.hamlib == hamlib_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfpower_is_normalized() {
        let d = level_descriptor("RFPOWER").unwrap();
        assert!(matches!(d.scale, ScaleKind::Normalized { .. }));
        assert!(d.has_get && d.has_set);
    }

    #[test]
    fn strength_is_absolute_get_only() {
        let d = level_descriptor("STRENGTH").unwrap();
        assert!(matches!(d.scale, ScaleKind::Absolute));
        assert!(d.has_get && !d.has_set);
    }

    #[test]
    fn att_preamp_are_enumerated() {
        let att = level_descriptor("ATT").unwrap();
        assert_eq!(att.scale, ScaleKind::Enumerated(&[0, 12]));
        let preamp = level_descriptor("PREAMP").unwrap();
        assert_eq!(preamp.scale, ScaleKind::Enumerated(&[0, 10, 20]));
    }

    #[test]
    fn nb_and_mon_have_sentinels() {
        assert_eq!(function_descriptor("NB").unwrap().sentinel, Some(8));
        assert_eq!(function_descriptor("MON").unwrap().sentinel, Some(50));
        assert_eq!(function_descriptor("VOX").unwrap().sentinel, None);
    }

    #[test]
    fn tuner_is_spa1_only() {
        assert!(function_descriptor("TUNER").unwrap().spa1_only);
    }

    #[test]
    fn unknown_level_and_function_are_none() {
        assert!(level_descriptor("BOGUS").is_none());
        assert!(function_descriptor("BOGUS").is_none());
    }
}

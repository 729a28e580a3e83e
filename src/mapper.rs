use crate::driver::RawValue;
use std::collections::HashMap;

// Only *some* of the SMA texts are converted, exactly as reported and case
// sensitive. Status keywords end up in every line, so keep them short.
#[rustfmt::skip]
const TRANSLATIONS: &[(&str, &str)] = &[
    ("Fehler", "error"),
    ("Netzueb.", "checking grid"),
    ("Warten", "waiting"),
    ("Riso", "isol-resist"),
    ("U-Konst", "constant-volt"),
    ("Stoer.", "failure"),
    ("-------", "ok"),
    //header entries
    ("Upv-Ist", "pv input voltage"),
    ("Upv-Soll", "internal pv voltage"),
    ("Fac", "grid freq"),
    ("Pac", "grid power"),
    ("Uac", "grid voltage"),
    ("Ipv", "pv panels current"),
    ("E-Total", "energy yield"),
    ("h-Total", "total operating hours"),
    ("h-On", "total start hours"),
    ("Netz-Ein", "total start-ups"),
    ("Iac-Ist", "current to grid"),
    ("Seriennummer", "serial number"),
];

/// A channel exactly as the driver reported it
#[derive(Clone, Debug)]
pub struct ChannelReading {
    pub name: String,
    pub unit: String,
    pub value: RawValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedReading {
    pub name: String,
    /// `name(unit)`, used as the CSV header entry
    pub label: String,
    pub value: String,
}

/// Immutable vendor-text translation table, built once at startup
pub struct Translations {
    table: HashMap<&'static str, &'static str>,
}

impl Translations {
    pub fn new() -> Self {
        Self {
            table: TRANSLATIONS.iter().copied().collect(),
        }
    }

    pub fn translate<'a>(&'a self, text: &'a str) -> &'a str {
        self.table.get(text).copied().unwrap_or(text)
    }

    /// Translates the channel name and, independently, a textual value.
    /// Numbers are rendered, not translated.
    pub fn normalize(&self, reading: &ChannelReading) -> NormalizedReading {
        let name = self.translate(&reading.name).to_string();
        let value = match &reading.value {
            RawValue::Text(text) => self.translate(text).to_string(),
            RawValue::Number(n) => format_number(*n),
        };
        NormalizedReading {
            label: format!("{}({})", name, reading.unit),
            name,
            value,
        }
    }
}

impl Default for Translations {
    fn default() -> Self {
        Self::new()
    }
}

/// Two decimals, with a trailing ".00" dropped
pub fn format_number(number: f64) -> String {
    let text = format!("{:.2}", number);
    match text.strip_suffix(".00") {
        Some(integral) => integral.to_string(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(name: &str, unit: &str, value: RawValue) -> ChannelReading {
        ChannelReading {
            name: name.into(),
            unit: unit.into(),
            value,
        }
    }

    #[test]
    fn every_table_entry_translates() {
        let t = Translations::new();
        for (vendor, normalized) in TRANSLATIONS {
            assert_eq!(t.translate(vendor), *normalized);
        }
    }

    #[test]
    fn unknown_and_translated_text_passes_through() {
        let t = Translations::new();
        assert_eq!(t.translate("GridMs.Hz"), "GridMs.Hz");
        assert_eq!(t.translate("fehler"), "fehler");
        for (_, normalized) in TRANSLATIONS {
            assert_eq!(t.translate(normalized), *normalized);
        }
    }

    #[test]
    fn name_and_value_translate_independently() {
        let t = Translations::new();
        let n = t.normalize(&reading("Fehler", "", RawValue::Text("Fehler".into())));
        assert_eq!(n.name, "error");
        assert_eq!(n.value, "error");
        assert_eq!(n.label, "error()");

        let n = t.normalize(&reading("Status", "", RawValue::Text("Warten".into())));
        assert_eq!(n.name, "Status");
        assert_eq!(n.value, "waiting");
    }

    #[test]
    fn numbers_are_rendered() {
        let t = Translations::new();
        let n = t.normalize(&reading("Pac", "W", RawValue::Number(1635.0)));
        assert_eq!(n.name, "grid power");
        assert_eq!(n.label, "grid power(W)");
        assert_eq!(n.value, "1635");

        assert_eq!(format_number(49.98), "49.98");
        assert_eq!(format_number(234.8), "234.80");
        assert_eq!(format_number(0.0), "0");
    }
}

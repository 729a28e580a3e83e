use crate::mapper::NormalizedReading;
use crate::writer::encode_row;
use chrono::{DateTime, Local};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const DATETIME_HEADER: &str = "#Datetime";

#[derive(Clone, Copy, Debug, PartialEq)]
enum FieldKind {
    Plain,
    /// reported in ohms, logged in kOhm
    KiloOhm,
}

pub struct Field {
    pub key: &'static str,
    /// channel names feeding this field, native vendor name or translated form
    pub accepts: &'static [&'static str],
    kind: FieldKind,
}

const fn field(key: &'static str, accepts: &'static [&'static str]) -> Field {
    Field {
        key,
        accepts,
        kind: FieldKind::Plain,
    }
}

/// Column order of every log line after the timestamp. Downstream consumers
/// depend on it, do not reorder.
#[rustfmt::skip]
pub const SCHEMA: [Field; 23] = [
    field("grid_power", &["grid power", "Pac"]),
    field("energy_yield", &["energy yield", "E-Total"]),
    field("string_a_power", &["A.Ms.Watt"]),
    field("string_b_power", &["B.Ms.Watt"]),
    field("string_a_voltage", &["A.Ms.Vol", "pv input voltage", "Upv-Ist"]),
    field("string_b_voltage", &["B.Ms.Vol"]),
    field("phase_a_voltage", &["GridMs.PhV.phsA", "grid voltage", "Uac"]),
    field("phase_b_voltage", &["GridMs.PhV.phsB"]),
    field("phase_c_voltage", &["GridMs.PhV.phsC"]),
    field("phase_a_current", &["GridMs.A.phsA", "current to grid", "Iac-Ist"]),
    field("phase_b_current", &["GridMs.A.phsB"]),
    field("phase_c_current", &["GridMs.A.phsC"]),
    field("string_a_current", &["A.Ms.Amp", "pv panels current", "Ipv"]),
    field("string_b_current", &["B.Ms.Amp"]),
    field("phase_a_power", &["GridMs.W.phsA"]),
    field("phase_b_power", &["GridMs.W.phsB"]),
    field("phase_c_power", &["GridMs.W.phsC"]),
    field("grid_frequency", &["GridMs.Hz", "grid freq", "Fac"]),
    field("power_factor", &["GridMs.TotPF"]),
    field("mode", &["Mode", "Status"]),
    field("error", &["Error", "error"]),
    field("operating_hours", &["total operating hours", "h-Total"]),
    Field { key: "insulation_resistance", accepts: &["isol-resist", "Riso"], kind: FieldKind::KiloOhm },
];

#[derive(Clone, Debug, Default, PartialEq)]
struct Slot {
    label: String,
    value: String,
}

/// One poll of one device, projected onto `SCHEMA`
#[derive(Clone, Debug)]
pub struct TelemetryRecord {
    timestamp: String,
    slots: Vec<Slot>,
}

impl TelemetryRecord {
    /// Readings are scanned in driver order; when several channels feed the
    /// same field the last one wins. Fields nobody reported stay empty.
    pub fn build(readings: &[NormalizedReading], now: DateTime<Local>) -> Self {
        let mut slots = vec![Slot::default(); SCHEMA.len()];
        for reading in readings {
            for (field, slot) in SCHEMA.iter().zip(slots.iter_mut()) {
                if field.accepts.contains(&reading.name.as_str()) {
                    slot.label = reading.label.clone();
                    slot.value = match field.kind {
                        FieldKind::Plain => reading.value.clone(),
                        FieldKind::KiloOhm => ohm_to_kiloohm(&reading.value),
                    };
                }
            }
        }

        Self {
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            slots,
        }
    }

    /// `#Datetime` followed by one label per schema field
    pub fn header_fields(&self) -> Vec<&str> {
        let mut fields = Vec::with_capacity(self.slots.len() + 1);
        fields.push(DATETIME_HEADER);
        fields.extend(self.slots.iter().map(|s| s.label.as_str()));
        fields
    }

    /// The timestamp followed by one value per schema field
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = Vec::with_capacity(self.slots.len() + 1);
        fields.push(self.timestamp.as_str());
        fields.extend(self.slots.iter().map(|s| s.value.as_str()));
        fields
    }

    pub fn header(&self) -> String {
        encode_row(&self.header_fields())
    }

    pub fn line(&self) -> String {
        encode_row(&self.fields())
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        SCHEMA
            .iter()
            .position(|f| f.key == key)
            .map(|i| self.slots[i].value.as_str())
    }
}

fn ohm_to_kiloohm(value: &str) -> String {
    match value.trim().parse::<f64>() {
        Ok(ohm) => format!("{:.2}", ohm / 1000.0),
        Err(e) => {
            warn!("cannot convert insulation resistance {:?}: {}", value, e);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reading(name: &str, unit: &str, value: &str) -> NormalizedReading {
        NormalizedReading {
            name: name.into(),
            label: format!("{}({})", name, unit),
            value: value.into(),
        }
    }

    fn at_noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2017, 1, 30, 15, 30, 45).unwrap()
    }

    fn columns(text: &str) -> Vec<&str> {
        text.split(',').collect()
    }

    #[test]
    fn empty_poll_still_has_timestamp_and_all_columns() {
        let record = TelemetryRecord::build(&[], at_noon());
        assert_eq!(record.line(), format!("2017-01-30T15:30:45{}", ",".repeat(23)));
        assert_eq!(record.header(), format!("#Datetime{}", ",".repeat(23)));
    }

    #[test]
    fn header_and_line_stay_aligned() {
        let readings = vec![
            reading("GridMs.Hz", "Hz", "49.98"),
            reading("grid power", "W", "1635"),
            reading("unrelated", "", "x"),
            reading("B.Ms.Amp", "A", "0.93"),
        ];
        let record = TelemetryRecord::build(&readings, at_noon());
        let header = record.header();
        let line = record.line();
        let h = columns(&header);
        let l = columns(&line);
        assert_eq!(h.len(), SCHEMA.len() + 1);
        assert_eq!(h.len(), l.len());

        assert_eq!(h[1], "grid power(W)");
        assert_eq!(l[1], "1635");
        assert_eq!(h[14], "B.Ms.Amp(A)");
        assert_eq!(l[14], "0.93");
        assert_eq!(h[18], "GridMs.Hz(Hz)");
        assert_eq!(l[18], "49.98");
        assert_eq!(l[2], "");
        assert!(!line.contains('x'));
    }

    #[test]
    fn driver_order_does_not_move_columns() {
        let a = vec![
            reading("Mode", "", "Mpp"),
            reading("A.Ms.Vol", "V", "455.40"),
        ];
        let b: Vec<_> = a.iter().rev().cloned().collect();
        let ra = TelemetryRecord::build(&a, at_noon());
        let rb = TelemetryRecord::build(&b, at_noon());
        assert_eq!(ra.line(), rb.line());
        assert_eq!(ra.header(), rb.header());
        assert_eq!(ra.value("mode"), Some("Mpp"));
        assert_eq!(ra.value("string_a_voltage"), Some("455.40"));
    }

    #[test]
    fn last_matching_channel_wins() {
        let readings = vec![
            reading("Mode", "", "Mpp"),
            reading("Status", "", "waiting"),
        ];
        let record = TelemetryRecord::build(&readings, at_noon());
        assert_eq!(record.value("mode"), Some("waiting"));
        assert!(record.header().contains("Status()"));
    }

    #[test]
    fn insulation_resistance_in_kiloohm() {
        let record =
            TelemetryRecord::build(&[reading("isol-resist", "Ohm", "3000000")], at_noon());
        assert_eq!(record.value("insulation_resistance"), Some("3000.00"));
        assert!(record.line().ends_with(",3000.00"));

        let record = TelemetryRecord::build(&[reading("isol-resist", "Ohm", "1234")], at_noon());
        assert_eq!(record.value("insulation_resistance"), Some("1.23"));
    }

    #[test]
    fn unparsable_insulation_resistance_is_empty() {
        let record =
            TelemetryRecord::build(&[reading("isol-resist", "Ohm", "n/a")], at_noon());
        assert_eq!(record.value("insulation_resistance"), Some(""));
        assert!(record.header().ends_with(",isol-resist(Ohm)"));
    }

    #[test]
    fn comma_in_value_keeps_header_and_line_aligned() {
        let readings = vec![
            reading("GridMs.TotPF", "", "1,00"),
            reading("Mode", "a,b", "Mpp"),
        ];
        let record = TelemetryRecord::build(&readings, at_noon());
        assert_eq!(record.fields().len(), record.header_fields().len());

        let parse = |text: String| {
            csv::ReaderBuilder::new()
                .has_headers(false)
                .from_reader(text.as_bytes())
                .records()
                .next()
                .unwrap()
                .unwrap()
        };
        let header = parse(record.header());
        let line = parse(record.line());
        assert_eq!(header.len(), SCHEMA.len() + 1);
        assert_eq!(line.len(), header.len());
        assert_eq!(&line[19], "1,00");
        assert_eq!(&header[20], "Mode(a,b)");
    }

    #[test]
    fn vendor_and_translated_names_share_a_field() {
        let raw = TelemetryRecord::build(&[reading("Pac", "W", "10")], at_noon());
        let translated = TelemetryRecord::build(&[reading("grid power", "W", "10")], at_noon());
        assert_eq!(raw.line(), translated.line());
    }
}

//! TB screening records
//!
//! [`ScreeningRaw`] is the shape stored in the screening table; [`ScreeningResult`]
//! is the renamed record published to the bus. The screening outcome rule and the
//! lab-method normalisation are pure and live here; registry lookups are done by
//! the transform in `core::transform::screening`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Affirmative answer used by every yes/no field
pub const YES: &str = "Ya";
/// Negative answer
pub const NO: &str = "Tidak";

/// Age from which the adult symptom set applies
pub const ADULT_AGE: i64 = 15;

/// Screening record as stored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningRaw {
    #[serde(rename = "pasien_id", deserialize_with = "lenient_string")]
    pub patient_id: String,
    #[serde(rename = "nik", deserialize_with = "lenient_string")]
    pub nik: String,
    #[serde(rename = "pasien_name", deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(rename = "jenis_kelamin", deserialize_with = "lenient_string")]
    pub sex: String,
    #[serde(rename = "tgl_lahir", deserialize_with = "lenient_string")]
    pub birth_date: String,
    #[serde(rename = "usia", deserialize_with = "lenient_int")]
    pub age: i64,
    #[serde(rename = "pekerjaan")]
    pub occupation: Option<String>,
    #[serde(rename = "provinsi_pasien")]
    pub province: Option<String>,
    #[serde(rename = "kabkota_pasien")]
    pub regency: Option<String>,
    #[serde(rename = "kecamatan_pasien")]
    pub district: Option<String>,
    #[serde(rename = "kelurahan_pasien")]
    pub village: Option<String>,
    #[serde(rename = "alamat")]
    pub address: Option<String>,
    #[serde(rename = "no_handphone", deserialize_with = "lenient_string")]
    pub phone: String,

    #[serde(rename = "kode_faskes")]
    pub facility_code: Option<String>,
    #[serde(rename = "nama_faskes")]
    pub facility_name: Option<String>,
    #[serde(rename = "provinsi_faskes")]
    pub facility_province: Option<String>,
    #[serde(rename = "kabkota_faskes")]
    pub facility_regency: Option<String>,
    #[serde(rename = "tgl_pemeriksaan", deserialize_with = "lenient_string")]
    pub examined_on: String,

    #[serde(rename = "berat_badan")]
    pub weight: Option<f64>,
    #[serde(rename = "tinggi_badan")]
    pub height: Option<f64>,
    #[serde(rename = "imt")]
    pub bmi_status: Option<String>,
    #[serde(rename = "kekurangan_gizi")]
    pub malnutrition: Option<String>,
    #[serde(rename = "merokok")]
    pub smoker: Option<String>,
    #[serde(rename = "perokok_pasif")]
    pub passive_smoker: Option<String>,
    #[serde(rename = "lansia_lebih_dari_65")]
    pub elderly: Option<String>,
    #[serde(rename = "ibu_hamil")]
    pub pregnant: Option<String>,
    #[serde(rename = "hasil_gds")]
    pub blood_glucose_random: Option<f64>,
    #[serde(rename = "hasil_gdp")]
    pub blood_glucose_fasting: Option<f64>,
    #[serde(rename = "hasil_gdpp")]
    pub blood_glucose_postprandial: Option<f64>,
    #[serde(rename = "pemeriksaan_chest_xray")]
    pub chest_xray: Option<String>,
    #[serde(rename = "metode_pemeriksaan_tb")]
    pub tb_method: Option<String>,
    #[serde(rename = "hasil_pemeriksaan_tb_bta")]
    pub tb_bta: Option<String>,
    #[serde(rename = "hasil_pemeriksaan_tb_tcm")]
    pub tb_tcm: Option<String>,
    #[serde(rename = "hasil_pemeriksaan_dm")]
    pub diabetes_result: Option<String>,
    #[serde(rename = "hasil_pemeriksaan_ht")]
    pub hypertension_result: Option<String>,
    #[serde(rename = "hasil_pemeriksaan_tb_poct")]
    pub tb_poct: Option<String>,
    #[serde(rename = "hasil_pemeriksaan_tb_radiologi")]
    pub tb_radiology: Option<String>,
    #[serde(rename = "inveksi_hiv_aids")]
    pub hiv_aids: Option<String>,

    #[serde(rename = "gejala_dan_tanda_batuk")]
    pub cough: Option<String>,
    #[serde(rename = "gejala_dan_tanda_bb_turun")]
    pub weight_loss: Option<String>,
    #[serde(rename = "gejala_dan_tanda_demam_hilang_timbul")]
    pub intermittent_fever: Option<String>,
    #[serde(rename = "gejala_dan_tanda_lesu_malaise")]
    pub malaise: Option<String>,
    #[serde(rename = "gejala_dan_tanda_berkeringat_malam")]
    pub night_sweats: Option<String>,
    #[serde(rename = "gejala_dan_tanda_pembesaran_getah_bening")]
    pub lymph_node_enlargement: Option<String>,
    #[serde(rename = "kontak_pasien_tbc")]
    pub tb_contact: Option<String>,
    #[serde(rename = "gejala_dan_tanda_tbc")]
    pub tb_symptoms: Option<String>,
    #[serde(rename = "tindak_lanjut_penegakan_diagnosa")]
    pub diagnosis_follow_up: Option<String>,
}

/// Screening record as published
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreeningResult {
    pub pasien_ckg_id: String,
    pub pasien_nik: String,
    pub pasien_nama: String,
    pub pasien_jenis_kelamin: String,
    pub pasien_tgl_lahir: String,
    pub pasien_usia: i64,
    pub pasien_pekerjaan: Option<String>,
    pub pasien_provinsi_satusehat: Option<String>,
    pub pasien_kabkota_satusehat: Option<String>,
    pub pasien_kecamatan_satusehat: Option<String>,
    pub pasien_kelurahan_satusehat: Option<String>,
    pub pasien_provinsi_sitb: Option<String>,
    pub pasien_kabkota_sitb: Option<String>,
    pub pasien_kecamatan_sitb: Option<String>,
    pub pasien_kelurahan_sitb: Option<String>,
    pub pasien_alamat: Option<String>,
    pub pasien_no_handphone: String,

    pub periksa_faskes_satusehat: Option<String>,
    pub periksa_faskes_sitb: Option<String>,
    pub periksa_tgl: String,

    pub hasil_berat_badan: Option<f64>,
    pub hasil_tinggi_badan: Option<f64>,
    pub hasil_imt: Option<String>,
    pub hasil_gds: Option<f64>,
    pub hasil_gdp: Option<f64>,
    pub hasil_gdpp: Option<f64>,

    pub risiko_kekurangan_gizi: Option<String>,
    pub risiko_merokok: Option<String>,
    pub risiko_perokok_pasif: Option<String>,
    pub risiko_lansia: Option<String>,
    pub risiko_ibu_hamil: Option<String>,
    pub risiko_dm: Option<String>,
    pub risiko_hipertensi: Option<String>,
    pub risiko_hiv_aids: Option<String>,

    pub gejala_batuk: Option<String>,
    pub gejala_bb_turun: Option<String>,
    pub gejala_demam_hilang_timbul: Option<String>,
    pub gejala_lesu_malaise: Option<String>,
    pub gejala_berkeringat_malam: Option<String>,
    pub gejala_pembesaran_getah_bening: Option<String>,
    pub kontak_pasien_tbc: Option<String>,
    pub hasil_skrining_tbc: Option<String>,
    pub terduga_tb: Option<String>,

    pub metode_pemeriksaan_tb: Option<String>,
    pub pemeriksaan_tb_bta: Option<String>,
    pub pemeriksaan_tb_tcm: Option<String>,
    pub pemeriksaan_tb_poct: Option<String>,
    pub pemeriksaan_tb_radiologi: Option<String>,
}

impl ScreeningResult {
    /// Renames a raw record and applies the screening outcome rule
    ///
    /// Registry ids (`*_sitb`) are left as the raw facility-side values; the
    /// transform overwrites them from the reference tables.
    pub fn from_raw(raw: &ScreeningRaw) -> Self {
        let mut result = Self {
            pasien_ckg_id: raw.patient_id.clone(),
            pasien_nik: raw.nik.clone(),
            pasien_nama: raw.name.clone(),
            pasien_jenis_kelamin: raw.sex.clone(),
            pasien_tgl_lahir: raw.birth_date.clone(),
            pasien_usia: raw.age,
            pasien_pekerjaan: raw.occupation.clone(),
            pasien_provinsi_satusehat: raw.province.clone(),
            pasien_kabkota_satusehat: raw.regency.clone(),
            pasien_kecamatan_satusehat: raw.district.clone(),
            pasien_kelurahan_satusehat: raw.village.clone(),
            pasien_provinsi_sitb: raw.facility_province.clone(),
            pasien_kabkota_sitb: raw.facility_regency.clone(),
            pasien_alamat: raw.address.clone(),
            pasien_no_handphone: raw.phone.clone(),
            periksa_faskes_satusehat: raw.facility_code.clone(),
            periksa_tgl: raw.examined_on.clone(),
            hasil_berat_badan: raw.weight,
            hasil_tinggi_badan: raw.height,
            hasil_imt: raw.bmi_status.clone(),
            hasil_gds: raw.blood_glucose_random,
            hasil_gdp: raw.blood_glucose_fasting,
            hasil_gdpp: raw.blood_glucose_postprandial,
            risiko_kekurangan_gizi: raw.malnutrition.clone(),
            risiko_merokok: raw.smoker.clone(),
            risiko_perokok_pasif: raw.passive_smoker.clone(),
            risiko_lansia: raw.elderly.clone(),
            risiko_ibu_hamil: raw.pregnant.clone(),
            risiko_hiv_aids: raw.hiv_aids.clone(),
            gejala_batuk: raw.cough.clone(),
            gejala_bb_turun: raw.weight_loss.clone(),
            gejala_demam_hilang_timbul: raw.intermittent_fever.clone(),
            gejala_lesu_malaise: raw.malaise.clone(),
            gejala_berkeringat_malam: raw.night_sweats.clone(),
            gejala_pembesaran_getah_bening: raw.lymph_node_enlargement.clone(),
            kontak_pasien_tbc: raw.tb_contact.clone(),
            hasil_skrining_tbc: raw.tb_symptoms.clone(),
            terduga_tb: raw.diagnosis_follow_up.clone(),
            metode_pemeriksaan_tb: raw.tb_method.clone(),
            pemeriksaan_tb_bta: raw.tb_bta.clone(),
            pemeriksaan_tb_tcm: raw.tb_tcm.clone(),
            pemeriksaan_tb_poct: raw.tb_poct.clone(),
            pemeriksaan_tb_radiologi: raw.tb_radiology.clone(),
            ..Self::default()
        };
        result.apply_screening_outcome(raw);
        result
    }

    /// True when the record flags a presumptive TB case
    pub fn is_presumptive(&self) -> bool {
        self.terduga_tb.as_deref() == Some(YES)
    }

    fn apply_screening_outcome(&mut self, raw: &ScreeningRaw) {
        let symptoms: Vec<&Option<String>> = if raw.age < ADULT_AGE {
            self.gejala_berkeringat_malam = None;
            self.gejala_pembesaran_getah_bening = None;
            vec![
                &raw.cough,
                &raw.weight_loss,
                &raw.intermittent_fever,
                &raw.malaise,
            ]
        } else {
            self.gejala_lesu_malaise = None;
            vec![
                &raw.cough,
                &raw.weight_loss,
                &raw.intermittent_fever,
                &raw.night_sweats,
                &raw.lymph_node_enlargement,
            ]
        };

        let positive = symptoms.iter().any(|s| is_yes(s));
        let outcome = if positive { YES } else { NO };
        self.hasil_skrining_tbc = Some(outcome.to_string());

        if !positive {
            return;
        }

        if let Some(method) = raw.tb_method.as_deref().map(str::to_uppercase) {
            match method.as_str() {
                "TCM" if raw.tb_tcm.is_some() => {
                    self.metode_pemeriksaan_tb = Some(method.clone());
                    if let Some(mapped) = raw
                        .tb_tcm
                        .as_deref()
                        .filter(|v| !v.is_empty())
                        .and_then(|v| map_tcm_result(&v.to_lowercase()))
                    {
                        self.pemeriksaan_tb_tcm = Some(mapped.to_string());
                    }
                }
                "BTA" if raw.tb_bta.is_some() => {
                    self.metode_pemeriksaan_tb = Some(method.clone());
                    self.pemeriksaan_tb_bta = raw
                        .tb_bta
                        .as_deref()
                        .filter(|v| !v.is_empty())
                        .map(str::to_lowercase);
                }
                _ => {}
            }
        }

        self.terduga_tb = Some(YES.to_string());
    }
}

fn is_yes(value: &Option<String>) -> bool {
    value.as_deref() == Some(YES)
}

/// Maps a lower-cased TCM (GeneXpert) result onto the registry vocabulary
pub fn map_tcm_result(value: &str) -> Option<&'static str> {
    match value {
        "neg" => Some("not_detected"),
        "rif sen" => Some("rif_sen"),
        "rif res" => Some("rif_res"),
        "rif indet" => Some("rif_indet"),
        "invalid" => Some("invalid"),
        "error" => Some("error"),
        "no result" => Some("no_result"),
        _ => None,
    }
}

/// Region registry row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_int")]
    pub level: i64,
    pub provinsi_id: Option<String>,
    pub kabupaten_id: Option<String>,
    pub kecamatan_id: Option<String>,
    pub kelurahan_id: Option<String>,
}

/// Facility registry row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacilityRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    pub kode_satusehat: Option<String>,
}

/// Region code split into its hierarchy level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionCode {
    /// Digits with separators removed
    pub digits: String,
    /// 1 = province, 2 = regency, 3 = district, 4 = village
    pub level: u8,
}

impl RegionCode {
    /// Normalises a code such as `32.01.01` or `320101`
    pub fn parse(code: &str) -> Self {
        let digits: String = code.chars().filter(|c| *c != '.').collect();
        let level = match digits.len() {
            10 => 4,
            6 => 3,
            4 => 2,
            _ => 1,
        };
        Self { digits, level }
    }

    /// Dotted registry id (`xx.xx.xx.xxxx`, `xx.xx.xx`, `xx.xx`, `xx`)
    pub fn dotted(&self) -> String {
        let d = &self.digits;
        match self.level {
            4 => format!("{}.{}.{}.{}", &d[0..2], &d[2..4], &d[4..6], &d[6..10]),
            3 => format!("{}.{}.{}", &d[0..2], &d[2..4], &d[4..6]),
            2 => format!("{}.{}", &d[0..2], &d[2..4]),
            _ => d.clone(),
        }
    }

    /// Codes of the ancestors, nearest first
    pub fn ancestors(&self) -> Vec<RegionCode> {
        [(3u8, 6usize), (2, 4), (1, 2)]
            .into_iter()
            .filter(|(level, _)| *level < self.level)
            .map(|(level, len)| RegionCode {
                digits: self.digits[..len].to_string(),
                level,
            })
            .collect()
    }
}

/// Accepts strings, numbers and null for string fields
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// Accepts integers, floats, numeric strings and null for integer fields
fn lenient_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn raw(value: Value) -> ScreeningRaw {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_raw_accepts_loose_types() {
        let raw = raw(json!({"pasien_id": 42, "usia": 31.0, "nik": null}));
        assert_eq!(raw.patient_id, "42");
        assert_eq!(raw.age, 31);
        assert_eq!(raw.nik, "");
    }

    #[test]
    fn test_child_screening_uses_malaise() {
        let result = ScreeningResult::from_raw(&raw(json!({
            "usia": 9,
            "gejala_dan_tanda_lesu_malaise": "Ya",
            "gejala_dan_tanda_berkeringat_malam": "Ya",
        })));
        assert_eq!(result.hasil_skrining_tbc.as_deref(), Some(YES));
        assert!(result.is_presumptive());
        assert_eq!(result.gejala_berkeringat_malam, None);
    }

    #[test]
    fn test_adult_screening_ignores_malaise() {
        let result = ScreeningResult::from_raw(&raw(json!({
            "usia": 40,
            "gejala_dan_tanda_lesu_malaise": "Ya",
        })));
        assert_eq!(result.hasil_skrining_tbc.as_deref(), Some(NO));
        assert_eq!(result.gejala_lesu_malaise, None);
        assert!(!result.is_presumptive());
    }

    #[test]
    fn test_follow_up_flag_keeps_record_in_scope() {
        let result = ScreeningResult::from_raw(&raw(json!({
            "usia": 40,
            "tindak_lanjut_penegakan_diagnosa": "Ya",
        })));
        assert_eq!(result.hasil_skrining_tbc.as_deref(), Some(NO));
        assert!(result.is_presumptive());
    }

    #[test_case("Neg", Some("not_detected"); "negative")]
    #[test_case("RIF Res", Some("rif_res"); "resistant")]
    #[test_case("pending", Some("pending"); "unmapped keeps raw")]
    fn test_tcm_method_mapping(tcm: &str, expected: Option<&str>) {
        let result = ScreeningResult::from_raw(&raw(json!({
            "usia": 30,
            "gejala_dan_tanda_batuk": "Ya",
            "metode_pemeriksaan_tb": "tcm",
            "hasil_pemeriksaan_tb_tcm": tcm,
        })));
        assert_eq!(result.metode_pemeriksaan_tb.as_deref(), Some("TCM"));
        assert_eq!(result.pemeriksaan_tb_tcm.as_deref(), expected);
    }

    #[test]
    fn test_bta_method_lowercases_result() {
        let result = ScreeningResult::from_raw(&raw(json!({
            "usia": 30,
            "gejala_dan_tanda_bb_turun": "Ya",
            "metode_pemeriksaan_tb": "BTA",
            "hasil_pemeriksaan_tb_bta": "Positif",
        })));
        assert_eq!(result.metode_pemeriksaan_tb.as_deref(), Some("BTA"));
        assert_eq!(result.pemeriksaan_tb_bta.as_deref(), Some("positif"));
    }

    #[test_case("3201011001", 4, "32.01.01.1001")]
    #[test_case("32.01.01", 3, "32.01.01")]
    #[test_case("3201", 2, "32.01")]
    #[test_case("32", 1, "32")]
    fn test_region_code_parse(code: &str, level: u8, dotted: &str) {
        let parsed = RegionCode::parse(code);
        assert_eq!(parsed.level, level);
        assert_eq!(parsed.dotted(), dotted);
    }

    #[test]
    fn test_region_code_ancestors() {
        let ancestors: Vec<String> = RegionCode::parse("3201011001")
            .ancestors()
            .iter()
            .map(RegionCode::dotted)
            .collect();
        assert_eq!(ancestors, vec!["32.01.01", "32.01", "32"]);
        assert!(RegionCode::parse("32").ancestors().is_empty());
    }
}

//! Closed vocabularies used by the crosswalk.

/// MODS `typeOfResource` values this exporter emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Text,
    StillImage,
    MovingImage,
    SoundRecording,
    SoftwareMultimedia,
    MixedMaterial,
    ThreeDimensionalObject,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Text => "text",
            ResourceType::StillImage => "still image",
            ResourceType::MovingImage => "moving image",
            ResourceType::SoundRecording => "sound recording",
            ResourceType::SoftwareMultimedia => "software, multimedia",
            ResourceType::MixedMaterial => "mixed material",
            ResourceType::ThreeDimensionalObject => "three dimensional object",
        }
    }

    /// Map a DCMI Type vocabulary term.
    ///
    /// Anything outside the table, including case variants, maps to
    /// [`ResourceType::Text`].
    pub fn from_dcmi(term: &str) -> Self {
        match term.trim() {
            "Text" => ResourceType::Text,
            "Image" | "StillImage" => ResourceType::StillImage,
            "MovingImage" => ResourceType::MovingImage,
            "Sound" => ResourceType::SoundRecording,
            "Dataset" | "InteractiveResource" | "Software" | "Service" => {
                ResourceType::SoftwareMultimedia
            }
            "Collection" | "Event" => ResourceType::MixedMaterial,
            "PhysicalObject" => ResourceType::ThreeDimensionalObject,
            _ => ResourceType::Text,
        }
    }
}

/// ISO 639-1 → ISO 639-2/B for the languages we expect in practice.
const LANGUAGE_CODES: &[(&str, &str)] = &[
    ("ar", "ara"),
    ("cs", "cze"),
    ("da", "dan"),
    ("de", "ger"),
    ("el", "gre"),
    ("en", "eng"),
    ("es", "spa"),
    ("fa", "per"),
    ("fi", "fin"),
    ("fr", "fre"),
    ("ga", "gle"),
    ("he", "heb"),
    ("hi", "hin"),
    ("hu", "hun"),
    ("it", "ita"),
    ("ja", "jpn"),
    ("ko", "kor"),
    ("la", "lat"),
    ("nl", "dut"),
    ("no", "nor"),
    ("pl", "pol"),
    ("pt", "por"),
    ("ru", "rus"),
    ("sv", "swe"),
    ("tr", "tur"),
    ("uk", "ukr"),
    ("vi", "vie"),
    ("yi", "yid"),
    ("zh", "chi"),
];

/// Downgrade a BCP 47 tag to a 3-letter ISO 639-2/B code.
///
/// The primary subtag is looked up case-insensitively; a 3-letter primary
/// subtag that is already a table value passes through. Anything else falls
/// back to the first three characters of the input as given, which can be
/// wrong (`"haw"` is fine, `"sr-Latn"` becomes `"sr-"`). That loss is accepted.
pub fn language_code(tag: &str) -> String {
    let tag = tag.trim();
    let primary = tag.split(['-', '_']).next().unwrap_or(tag).to_ascii_lowercase();

    if let Some((_, code)) = LANGUAGE_CODES.iter().find(|(two, _)| *two == primary) {
        return code.to_string();
    }
    if let Some((_, code)) = LANGUAGE_CODES.iter().find(|(_, three)| *three == primary) {
        return code.to_string();
    }
    tag.chars().take(3).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_dcmi_types() {
        assert_eq!(ResourceType::from_dcmi("Image").as_str(), "still image");
        assert_eq!(ResourceType::from_dcmi("StillImage").as_str(), "still image");
        assert_eq!(ResourceType::from_dcmi("Sound").as_str(), "sound recording");
        assert_eq!(
            ResourceType::from_dcmi("PhysicalObject").as_str(),
            "three dimensional object"
        );
        assert_eq!(ResourceType::from_dcmi("Collection").as_str(), "mixed material");
    }

    #[test]
    fn unknown_type_defaults_to_text() {
        assert_eq!(ResourceType::from_dcmi("Hologram"), ResourceType::Text);
        assert_eq!(ResourceType::from_dcmi("image"), ResourceType::Text);
        assert_eq!(ResourceType::from_dcmi(""), ResourceType::Text);
    }

    #[test]
    fn language_downgrade() {
        assert_eq!(language_code("en"), "eng");
        assert_eq!(language_code("en-US"), "eng");
        assert_eq!(language_code("FR"), "fre");
        assert_eq!(language_code("ger"), "ger");
    }

    #[test]
    fn language_fallback_is_lossy_prefix() {
        assert_eq!(language_code("haw"), "haw");
        assert_eq!(language_code("sr-Latn"), "sr-");
        assert_eq!(language_code("Tlh"), "Tlh");
    }
}

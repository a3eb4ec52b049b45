use crate::aggregate::PerceptionResult;
use crate::depth::{Distance, Proximity};
use crate::Language;

/// Language-specific wording for spoken feedback.
#[derive(Debug, PartialEq, Eq)]
pub struct Phrasebook {
    pub very_close: &'static str,
    pub close: &'static str,
    pub medium: &'static str,
    pub far: &'static str,
    pub very_far: &'static str,
    pub unknown_distance: &'static str,
    pub text_prefix: &'static str,
    pub scale_word: &'static str,
    pub scene_prefix: &'static str,
}

pub static ENGLISH: Phrasebook = Phrasebook {
    very_close: "very close",
    close: "close",
    medium: "medium",
    far: "far",
    very_far: "very far",
    unknown_distance: "distance unavailable",
    text_prefix: "Text: ",
    scale_word: "scale",
    scene_prefix: "You are in",
};

pub static SLOVENIAN: Phrasebook = Phrasebook {
    very_close: "zelo blizu",
    close: "blizu",
    medium: "srednje daleč",
    far: "daleč",
    very_far: "zelo daleč",
    unknown_distance: "razdalja ni znana",
    text_prefix: "Napis: ",
    scale_word: "stopnja",
    scene_prefix: "Nahajate se v prostoru",
};

impl Phrasebook {
    pub fn for_language(language: Language) -> &'static Phrasebook {
        match language {
            Language::En => &ENGLISH,
            Language::Sl => &SLOVENIAN,
        }
    }

    pub fn proximity(&self, proximity: Proximity) -> &'static str {
        match proximity {
            Proximity::VeryClose => self.very_close,
            Proximity::Close => self.close,
            Proximity::Medium => self.medium,
            Proximity::Far => self.far,
            Proximity::VeryFar => self.very_far,
        }
    }

    pub fn distance(&self, distance: Distance) -> &'static str {
        match distance.proximity() {
            Some(proximity) => self.proximity(proximity),
            None => self.unknown_distance,
        }
    }

    /// `"<label>, <phrase>"`, followed by `". <prefix><text>"` when text was read.
    pub fn describe(&self, result: &PerceptionResult) -> String {
        let mut message = format!(
            "{}, {}",
            result.bounding_box.class_name,
            self.distance(result.distance)
        );
        if let Some(text) = result.recognized_text.as_deref().filter(|t| !t.trim().is_empty()) {
            message.push_str(". ");
            message.push_str(self.text_prefix);
            message.push_str(text);
        }
        message
    }

    pub fn describe_scene(&self, label: &str) -> String {
        format!("{} {}", self.scene_prefix, label)
    }

    /// Center-of-view announcement, e.g. `"close, scale 4"`.
    pub fn describe_center(&self, distance: Distance) -> String {
        match distance {
            Distance::Scale(scale) => {
                format!("{}, {} {}", self.distance(distance), self.scale_word, scale)
            }
            Distance::Unknown => self.unknown_distance.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::DistanceScale;
    use crate::detect::BoundingBox;

    fn result(distance: Distance, text: Option<&str>) -> PerceptionResult {
        PerceptionResult {
            bounding_box: BoundingBox::from_center(0.5, 0.5, 0.2, 0.2, 0.9, 0, "door".into()),
            distance,
            recognized_text: text.map(str::to_string),
        }
    }

    #[test]
    fn describes_label_distance_and_text() {
        let en = Phrasebook::for_language(Language::En);
        let near = Distance::Scale(DistanceScale::new(3));
        assert_eq!(en.describe(&result(near, None)), "door, close");
        assert_eq!(
            en.describe(&result(near, Some("EXIT"))),
            "door, close. Text: EXIT"
        );
        assert_eq!(
            en.describe(&result(Distance::Unknown, Some("  "))),
            "door, distance unavailable"
        );
    }

    #[test]
    fn unknown_is_not_very_far() {
        for language in [Language::En, Language::Sl] {
            let book = Phrasebook::for_language(language);
            let farthest = Distance::Scale(DistanceScale::new(11));
            assert_ne!(book.distance(Distance::Unknown), book.distance(farthest));
        }
    }

    #[test]
    fn slovenian_center_announcement() {
        let sl = Phrasebook::for_language(Language::Sl);
        assert_eq!(
            sl.describe_center(Distance::Scale(DistanceScale::new(2))),
            "zelo blizu, stopnja 2"
        );
        assert_eq!(sl.describe_center(Distance::Unknown), "razdalja ni znana");
        assert_eq!(sl.describe_scene("kuhinja"), "Nahajate se v prostoru kuhinja");
    }
}

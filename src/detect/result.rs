use anyhow::{anyhow, Result};

/// COCO class index for "person".
pub const PERSON_CLASS_ID: u32 = 0;

/// One detected object, in pixel coordinates of the frame it was computed on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Score in `[0, 1]`.
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: u32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
        }
    }

    pub fn person(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Self {
        Self::new(x1, y1, x2, y2, confidence, PERSON_CLASS_ID)
    }

    pub fn is_person(&self) -> bool {
        self.class_id == PERSON_CLASS_ID
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &Detection) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Reject detector output the rest of the pipeline cannot use.
    pub fn validate(&self) -> Result<()> {
        let coords = [self.x1, self.y1, self.x2, self.y2];
        if coords.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!("detection has non-finite coordinates {:?}", coords));
        }
        if self.x2 < self.x1 || self.y2 < self.y1 {
            return Err(anyhow!("detection box is inverted {:?}", coords));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow!(
                "detection confidence {} is outside [0, 1]",
                self.confidence
            ));
        }
        Ok(())
    }
}

/// Validate every detection, then keep the person-class ones.
///
/// Each frame's detections are independent; overlapping boxes are kept as-is.
pub fn filter_persons(detections: Vec<Detection>) -> Result<Vec<Detection>> {
    for detection in &detections {
        detection.validate()?;
    }
    Ok(detections.into_iter().filter(Detection::is_person).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_keeps_only_persons() -> Result<()> {
        let detections = vec![
            Detection::person(0.0, 0.0, 10.0, 20.0, 0.9),
            Detection::new(5.0, 5.0, 15.0, 15.0, 0.8, 2),
            Detection::person(1.0, 1.0, 10.0, 20.0, 0.7),
        ];
        let persons = filter_persons(detections)?;
        assert_eq!(persons.len(), 2);
        assert!(persons.iter().all(Detection::is_person));
        Ok(())
    }

    #[test]
    fn malformed_output_is_rejected() {
        assert!(filter_persons(vec![Detection::person(f32::NAN, 0.0, 1.0, 1.0, 0.5)]).is_err());
        assert!(filter_persons(vec![Detection::person(5.0, 0.0, 1.0, 1.0, 0.5)]).is_err());
        assert!(filter_persons(vec![Detection::person(0.0, 0.0, 1.0, 1.0, 1.5)]).is_err());
        // Malformed non-person output still counts as a fault.
        assert!(filter_persons(vec![Detection::new(0.0, 0.0, 1.0, 1.0, -0.1, 7)]).is_err());
    }

    #[test]
    fn empty_input_is_not_an_error() -> Result<()> {
        assert!(filter_persons(Vec::new())?.is_empty());
        Ok(())
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = Detection::person(0.0, 0.0, 10.0, 10.0, 0.5);
        let b = Detection::person(20.0, 20.0, 30.0, 30.0, 0.5);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }
}

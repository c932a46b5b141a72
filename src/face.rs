//! Matching a captured face against the stored descriptors of a school.

use ndarray::ArrayView1;
use serde::Serialize;

use crate::models::{FaceDescriptor, Student};

/// Descriptors closer than this belong to the same person.
pub const MATCH_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownFace {
    pub id: i64,
    pub name: String,
    pub face_descriptor: FaceDescriptor,
}

impl KnownFace {
    pub fn from_students(students: Vec<Student>) -> Vec<KnownFace> {
        students
            .into_iter()
            .filter_map(|student| {
                let descriptor = student.face_descriptor?.0;
                Some(KnownFace {
                    id: student.id,
                    name: student.name,
                    face_descriptor: descriptor,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceMatch {
    pub student_id: i64,
    pub name: String,
    pub distance: f64,
}

pub fn distance(a: &FaceDescriptor, b: &FaceDescriptor) -> f64 {
    let a = ArrayView1::from(a.values());
    let b = ArrayView1::from(b.values());
    let diff = &a - &b;
    diff.dot(&diff).sqrt()
}

/// Nearest known face under [`MATCH_THRESHOLD`], if any.
pub fn best_match(probe: &FaceDescriptor, known: &[KnownFace]) -> Option<FaceMatch> {
    known
        .iter()
        .map(|face| (face, distance(probe, &face.face_descriptor)))
        .filter(|(_, d)| *d < MATCH_THRESHOLD)
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(face, distance)| FaceMatch {
            student_id: face.id,
            name: face.name.clone(),
            distance,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FACE_DESCRIPTOR_LEN;

    fn descriptor(fill: f64) -> FaceDescriptor {
        FaceDescriptor::try_from(vec![fill; FACE_DESCRIPTOR_LEN]).unwrap()
    }

    fn known(id: i64, fill: f64) -> KnownFace {
        KnownFace {
            id,
            name: format!("Student {id}"),
            face_descriptor: descriptor(fill),
        }
    }

    #[test]
    fn identical_descriptors_have_zero_distance() {
        assert_eq!(distance(&descriptor(0.3), &descriptor(0.3)), 0.0);
    }

    #[test]
    fn picks_the_closest_face_under_threshold() {
        let faces = vec![known(1, 0.0), known(2, 0.1), known(3, 0.2)];
        // 128 * 0.01^2 = 0.0128 -> distance ~0.113 to face 2.
        let found = best_match(&descriptor(0.11), &faces).unwrap();
        assert_eq!(found.student_id, 2);
        assert!(found.distance < MATCH_THRESHOLD);
    }

    #[test]
    fn distant_faces_do_not_match() {
        let faces = vec![known(1, 0.0)];
        // sqrt(128) * 0.1 ~ 1.13
        assert!(best_match(&descriptor(0.1), &faces).is_none());
        assert!(best_match(&descriptor(0.1), &[]).is_none());
    }
}

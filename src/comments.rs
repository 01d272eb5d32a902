//! Report card remarks
//!
//! Teacher and principal remarks are picked from a fixed set per
//! performance tier and address the student by last name. Randomness is
//! injected so callers (and tests) control the choice.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Placeholder replaced with the student's last name
const NAME: &str = "{name}";

/// Performance band of an overall percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PerformanceTier {
    NeedsImprovement,
    Fair,
    Good,
    VeryGood,
    Excellent,
}

impl PerformanceTier {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 70.0 {
            Self::Excellent
        } else if percentage >= 60.0 {
            Self::VeryGood
        } else if percentage >= 50.0 {
            Self::Good
        } else if percentage >= 40.0 {
            Self::Fair
        } else {
            Self::NeedsImprovement
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::VeryGood => "very good",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::NeedsImprovement => "needs improvement",
        }
    }

    fn teacher_templates(&self) -> &'static [&'static str] {
        match self {
            Self::Excellent => &[
                "{name} has shown exceptional academic performance this term. Keep up the excellent work!",
                "Outstanding achievement this term! {name} demonstrates strong understanding and dedication to learning.",
                "{name} has maintained an excellent standard throughout this term. A truly commendable performance.",
            ],
            Self::VeryGood => &[
                "{name} has performed very well this term. With a little more effort, excellence is within reach.",
                "A very good performance from {name}. Continue with the same dedication and aim higher.",
                "{name} shows great potential and has done very well this term. Keep striving for the best.",
            ],
            Self::Good => &[
                "{name} has shown good effort this term. There is room for improvement with more focus and hard work.",
                "A satisfactory performance from {name}. With extra effort, better results are achievable.",
                "{name} is capable of more. Encourage consistent study habits for improved performance next term.",
            ],
            Self::Fair => &[
                "{name} needs to put in more effort. With additional support and dedication, improvement is possible.",
                "{name} should focus more on studies. Regular revision and asking questions will help improve performance.",
                "{name} has the potential to do better. Extra tutoring and more practice are recommended.",
            ],
            Self::NeedsImprovement => &[
                "{name} needs significant improvement. Extra classes and consistent practice are strongly recommended.",
                "{name} should seek additional help and focus on building strong foundations in all subjects.",
                "{name} requires intensive support. Regular study sessions and parent involvement will be beneficial.",
            ],
        }
    }

    fn principal_templates(&self) -> &'static [&'static str] {
        match self {
            Self::Excellent => &[
                "{name} is a model student who consistently demonstrates excellence. The school is proud of this achievement.",
                "Congratulations to {name} on an outstanding performance. Continue to be an inspiration to others.",
                "{name} has achieved excellent results. We look forward to continued success in future terms.",
            ],
            Self::VeryGood => &[
                "{name} has shown commendable effort and achieved very good results. Keep up the good work.",
                "Well done to {name} on a very good performance. The potential for excellence is evident.",
                "{name} is on the right track. Continue working hard and aim for even greater heights.",
            ],
            Self::Good => &[
                "{name} has shown satisfactory progress. With increased focus, even better results are attainable.",
                "We encourage {name} to continue making efforts. The school supports all students on their learning journey.",
                "{name} has the ability to excel. We encourage more dedication to studies next term.",
            ],
            Self::Fair => &[
                "{name} should dedicate more time to academic work. The school will provide necessary support for improvement.",
                "We urge {name} to take studies more seriously. With proper guidance and effort, improvement is possible.",
                "{name} needs to focus more on academics. We recommend parent-teacher collaboration for support.",
            ],
            Self::NeedsImprovement => &[
                "{name} requires immediate academic intervention. We recommend scheduling a meeting to discuss a support plan.",
                "The school is concerned about {name}'s performance. A structured study plan and monitoring are recommended.",
                "{name} needs intensive academic support. We encourage parents to work closely with teachers for improvement.",
            ],
        }
    }
}

/// Last whitespace-separated word of a full name
pub fn last_name(full_name: &str) -> &str {
    full_name.split_whitespace().last().unwrap_or("")
}

/// Remark from the class teacher
pub fn teacher_comment<R: Rng + ?Sized>(student_name: &str, percentage: f64, rng: &mut R) -> String {
    let tier = PerformanceTier::from_percentage(percentage);
    render(tier.teacher_templates(), student_name, rng)
}

/// Remark from the principal
pub fn principal_comment<R: Rng + ?Sized>(student_name: &str, percentage: f64, rng: &mut R) -> String {
    let tier = PerformanceTier::from_percentage(percentage);
    render(tier.principal_templates(), student_name, rng)
}

fn render<R: Rng + ?Sized>(templates: &[&str], student_name: &str, rng: &mut R) -> String {
    templates
        .choose(rng)
        .map(|t| t.replace(NAME, last_name(student_name)))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(PerformanceTier::from_percentage(100.0), PerformanceTier::Excellent);
        assert_eq!(PerformanceTier::from_percentage(70.0), PerformanceTier::Excellent);
        assert_eq!(PerformanceTier::from_percentage(69.99), PerformanceTier::VeryGood);
        assert_eq!(PerformanceTier::from_percentage(60.0), PerformanceTier::VeryGood);
        assert_eq!(PerformanceTier::from_percentage(50.0), PerformanceTier::Good);
        assert_eq!(PerformanceTier::from_percentage(40.0), PerformanceTier::Fair);
        assert_eq!(PerformanceTier::from_percentage(39.9), PerformanceTier::NeedsImprovement);
        assert_eq!(PerformanceTier::from_percentage(0.0), PerformanceTier::NeedsImprovement);
    }

    #[test]
    fn test_last_name() {
        assert_eq!(last_name("Ada Chioma Okafor"), "Okafor");
        assert_eq!(last_name("  Bello  "), "Bello");
        assert_eq!(last_name(""), "");
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for pct in [15.0, 45.0, 55.0, 65.0, 95.0] {
            assert_eq!(
                teacher_comment("Ada Okafor", pct, &mut a),
                teacher_comment("Ada Okafor", pct, &mut b)
            );
            assert_eq!(
                principal_comment("Ada Okafor", pct, &mut a),
                principal_comment("Ada Okafor", pct, &mut b)
            );
        }
    }

    #[test]
    fn test_remarks_name_the_student() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let pct = rng.gen_range(0.0..=100.0);
            let teacher = teacher_comment("Tunde Bakare", pct, &mut rng);
            let principal = principal_comment("Tunde Bakare", pct, &mut rng);
            assert!(teacher.contains("Bakare"));
            assert!(principal.contains("Bakare"));
            assert!(!teacher.contains("Tunde"));
            assert!(!teacher.contains(NAME));
        }
    }

    #[test]
    fn test_remark_comes_from_tier() {
        let mut rng = StdRng::seed_from_u64(1);
        let remark = teacher_comment("Okafor", 82.0, &mut rng);
        let expected: Vec<String> = PerformanceTier::Excellent
            .teacher_templates()
            .iter()
            .map(|t| t.replace(NAME, "Okafor"))
            .collect();
        assert!(expected.contains(&remark));
    }
}

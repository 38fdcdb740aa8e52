//! Consultation data models: specialties, the nutrition profile and the
//! question/answer transcript.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConsultError;

/// The consultation domain the user picked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialty {
    Nutritionist,
    Physician,
    MentalHealth,
    Orthopedic,
    Dentist,
    Other(String),
}

impl Specialty {
    /// The built-in specialties offered on the selection menu.
    pub const MENU: [Specialty; 5] = [
        Specialty::Nutritionist,
        Specialty::Physician,
        Specialty::MentalHealth,
        Specialty::Orthopedic,
        Specialty::Dentist,
    ];

    /// Whether a profile must be collected before the problem description.
    pub fn requires_profile(&self) -> bool {
        matches!(self, Self::Nutritionist)
    }

    /// Canonical form of a specialty that arrived from outside the menu.
    ///
    /// `Other` names are trimmed, blank ones rejected, and names of the
    /// built-in specialties mapped back to their variants.
    pub fn normalized(&self) -> Result<Specialty, ConsultError> {
        match self {
            Self::Other(name) => name.parse(),
            builtin => Ok(builtin.clone()),
        }
    }

    /// Heading shown for the consultation.
    pub fn title(&self) -> &str {
        match self {
            Self::Nutritionist => "Nutrition Specialist",
            Self::Physician => "General Physician",
            Self::MentalHealth => "Mental Health Expert",
            Self::Orthopedic => "Orthopedic Surgeon",
            Self::Dentist => "Dental Specialist",
            Self::Other(name) => name,
        }
    }

    /// Compact identifier used in export filenames.
    pub fn slug(&self) -> String {
        match self {
            Self::Nutritionist => "Nutritionist".to_string(),
            Self::Physician => "General_Physician".to_string(),
            Self::MentalHealth => "Mental_Health".to_string(),
            Self::Orthopedic => "Orthopedic".to_string(),
            Self::Dentist => "Dentist".to_string(),
            Self::Other(name) => {
                let slug: String = name
                    .trim()
                    .chars()
                    .map(|c| if c.is_alphanumeric() { c } else { '_' })
                    .collect();
                if slug.is_empty() {
                    "Consultation".to_string()
                } else {
                    slug
                }
            }
        }
    }
}

impl std::fmt::Display for Specialty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nutritionist => write!(f, "Nutritionist"),
            Self::Physician => write!(f, "General Physician"),
            Self::MentalHealth => write!(f, "Mental Health"),
            Self::Orthopedic => write!(f, "Orthopedic"),
            Self::Dentist => write!(f, "Dentist"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for Specialty {
    type Err = ConsultError;

    /// Parse a menu choice. Unknown non-empty names become `Other`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ConsultError::validation("specialty", "please choose a specialty"));
        }
        let lower = trimmed.to_lowercase();
        let specialty = match lower.as_str() {
            "nutritionist" | "nutrition" | "diet" | "dietitian" => Self::Nutritionist,
            "physician" | "general physician" | "gp" | "doctor" | "general" => Self::Physician,
            "mental health" | "mental" | "mental_health" | "psychologist" | "therapist" => {
                Self::MentalHealth
            }
            "orthopedic" | "ortho" | "orthopaedic" | "bones" => Self::Orthopedic,
            "dentist" | "dental" | "teeth" => Self::Dentist,
            _ => Self::Other(trimmed.to_string()),
        };
        Ok(specialty)
    }
}

/// Gender options on the nutrition profile form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Male => write!(f, "Male"),
            Self::Female => write!(f, "Female"),
            Self::Other => write!(f, "Other"),
        }
    }
}

impl FromStr for Gender {
    type Err = ConsultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Ok(Self::Male),
            "female" | "f" => Ok(Self::Female),
            "other" | "o" => Ok(Self::Other),
            _ => Err(ConsultError::validation(
                "gender",
                "choose one of Male, Female or Other",
            )),
        }
    }
}

/// BMI classification with fixed thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiCategory {
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < 18.5 {
            Self::Underweight
        } else if bmi < 25.0 {
            Self::Normal
        } else if bmi < 30.0 {
            Self::Overweight
        } else {
            Self::Obese
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Underweight => "Underweight",
            Self::Normal => "Normal Weight",
            Self::Overweight => "Overweight",
            Self::Obese => "Obese",
        }
    }

    /// Short guidance shown next to the BMI.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Underweight => {
                "Your BMI is below the healthy range. Focus on nutrient-dense meals and \
                 regular snacks to gain weight gradually."
            }
            Self::Normal => {
                "Your BMI is in the healthy range. Keep up balanced meals and regular \
                 physical activity."
            }
            Self::Overweight => {
                "Your BMI is above the healthy range. Portion control, more vegetables and \
                 daily movement can help."
            }
            Self::Obese => {
                "Your BMI is well above the healthy range. A structured plan with a \
                 healthcare professional is recommended."
            }
        }
    }
}

impl std::fmt::Display for BmiCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Raw profile form input as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileForm {
    pub age: String,
    pub weight_kg: String,
    pub height_cm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
}

/// Validated nutrition profile with derived BMI fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub age: u32,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub gender: Gender,
    pub bmi: f64,
    pub bmi_category: BmiCategory,
}

impl Profile {
    /// Validate a form and compute the derived BMI fields.
    pub fn from_form(form: &ProfileForm) -> Result<Self, ConsultError> {
        let age = form
            .age
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|a| *a > 0)
            .ok_or_else(|| ConsultError::validation("age", "enter a whole number above 0"))?;
        let weight_kg = parse_positive(&form.weight_kg, "weight")?;
        let height_cm = parse_positive(&form.height_cm, "height")?;
        let gender = form
            .gender
            .ok_or_else(|| ConsultError::validation("gender", "please select a gender"))?;

        let bmi = compute_bmi(weight_kg, height_cm);
        Ok(Self {
            age,
            weight_kg,
            height_cm,
            gender,
            bmi,
            bmi_category: BmiCategory::from_bmi(bmi),
        })
    }

    pub fn advice(&self) -> &'static str {
        self.bmi_category.advice()
    }
}

fn parse_positive(raw: &str, field: &str) -> Result<f64, ConsultError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| ConsultError::validation(field, "enter a number above 0"))
}

/// BMI rounded to one decimal place.
pub fn compute_bmi(weight_kg: f64, height_cm: f64) -> f64 {
    let meters = height_cm / 100.0;
    let bmi = weight_kg / (meters * meters);
    (bmi * 10.0).round() / 10.0
}

/// One answered follow-up question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
}

impl QuestionAnswer {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

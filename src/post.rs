use crate::global_variables::*;
use std::fmt;

pub struct PostResult {
    pub name: String,
    pub label: String,
    pub value: Float,
    pub unit: Option<String>,
}

impl PostResult {
    pub fn new(name: String, label: String, value: Float, unit: Option<String>) -> Self {
        Self {
            name,
            label,
            value,
            unit,
        }
    }
}

impl fmt::Display for PostResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{} = {:.8e} {}", self.label, self.value, unit),
            None => write!(f, "{} = {:.8e}", self.label, self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_shows_label_and_unit() {
        let mass = PostResult::new(
            "total_mass".to_string(),
            "total mass".to_string(),
            1.5,
            Some("kg/m".to_string()),
        );
        assert_eq!(mass.to_string(), "total mass = 1.50000000e0 kg/m");
        let mach = PostResult::new("max_mach".to_string(), "maximum Mach number".to_string(), 2.0, None);
        assert_eq!(mach.to_string(), "maximum Mach number = 2.00000000e0");
    }
}

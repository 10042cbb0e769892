//! PlantVillage class label table
//!
//! Labels are positional: index `i` names output `i` of the classifier.
//! The order below matches the alphabetical folder order used at training
//! time and must not change without retraining.

use serde::Serialize;

/// Number of classes the default model predicts
pub const NUM_CLASSES: usize = 38;

/// Class names, format "Plant___Disease" or "Plant___healthy"
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "Apple___Apple_scab",                                 // 0
    "Apple___Black_rot",                                  // 1
    "Apple___Cedar_apple_rust",                           // 2
    "Apple___healthy",                                    // 3
    "Blueberry___healthy",                                // 4
    "Cherry_(including_sour)___Powdery_mildew",           // 5
    "Cherry_(including_sour)___healthy",                  // 6
    "Corn_(maize)___Cercospora_leaf_spot Gray_leaf_spot", // 7
    "Corn_(maize)___Common_rust_",                        // 8
    "Corn_(maize)___Northern_Leaf_Blight",                // 9
    "Corn_(maize)___healthy",                             // 10
    "Grape___Black_rot",                                  // 11
    "Grape___Esca_(Black_Measles)",                       // 12
    "Grape___Leaf_blight_(Isariopsis_Leaf_Spot)",         // 13
    "Grape___healthy",                                    // 14
    "Orange___Haunglongbing_(Citrus_greening)",           // 15
    "Peach___Bacterial_spot",                             // 16
    "Peach___healthy",                                    // 17
    "Pepper,_bell___Bacterial_spot",                      // 18
    "Pepper,_bell___healthy",                             // 19
    "Potato___Early_blight",                              // 20
    "Potato___Late_blight",                               // 21
    "Potato___healthy",                                   // 22
    "Raspberry___healthy",                                // 23
    "Soybean___healthy",                                  // 24
    "Squash___Powdery_mildew",                            // 25
    "Strawberry___Leaf_scorch",                           // 26
    "Strawberry___healthy",                               // 27
    "Tomato___Bacterial_spot",                            // 28
    "Tomato___Early_blight",                              // 29
    "Tomato___Late_blight",                               // 30
    "Tomato___Leaf_Mold",                                 // 31
    "Tomato___Septoria_leaf_spot",                        // 32
    "Tomato___Spider_mites Two-spotted_spider_mite",      // 33
    "Tomato___Target_Spot",                               // 34
    "Tomato___Tomato_Yellow_Leaf_Curl_Virus",             // 35
    "Tomato___Tomato_mosaic_virus",                       // 36
    "Tomato___healthy",                                   // 37
];

/// Get the class name for a given label index
pub fn class_name(label: usize) -> Option<&'static str> {
    CLASS_NAMES.get(label).copied()
}

/// Ordered mapping from model output index to class name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelTable {
    names: Vec<String>,
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::plant_village()
    }
}

impl LabelTable {
    /// The 38-class PlantVillage table
    pub fn plant_village() -> Self {
        Self::new(CLASS_NAMES.iter().map(|s| s.to_string()).collect())
    }

    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_constant() {
        let table = LabelTable::plant_village();
        assert_eq!(table.len(), NUM_CLASSES);
        for (i, name) in table.iter().enumerate() {
            assert_eq!(Some(name), class_name(i));
        }
    }

    #[test]
    fn test_positions_are_stable() {
        assert_eq!(class_name(0), Some("Apple___Apple_scab"));
        assert_eq!(class_name(30), Some("Tomato___Late_blight"));
        assert_eq!(class_name(37), Some("Tomato___healthy"));
        assert_eq!(class_name(38), None);
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<&str> = CLASS_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), NUM_CLASSES);
    }

    #[test]
    fn test_serializes_as_array() {
        let table = LabelTable::new(vec!["a".into(), "b".into()]);
        assert_eq!(serde_json::to_string(&table).unwrap(), r#"["a","b"]"#);
    }
}

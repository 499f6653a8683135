use shelfmate_core::domain::topic::Topic;

/// Ordered keyword table. The first row with a matching keyword wins.
const KEYWORD_TABLE: &[(Topic, &[&str])] = &[
    (Topic::Healing, &["힘들", "지친", "번아웃", "피곤", "우울", "스트레스", "지쳐"]),
    (Topic::Relationship, &["싸웠", "다퉜", "짜증", "화나", "관계", "갈등", "오해"]),
    (Topic::Growth, &["즐거웠", "좋았", "행복", "기뻤", "신났", "기쁨", "설레"]),
    (Topic::Comfort, &["불안", "걱정", "두려", "무서", "초조"]),
    (Topic::Empathy, &["외로", "쓸쓸", "혼자", "고독"]),
];

#[derive(Clone, Copy, Debug, Default)]
pub struct TopicClassifier;

impl TopicClassifier {
    pub fn classify(&self, text: &str) -> Topic {
        KEYWORD_TABLE
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|keyword| text.contains(keyword)))
            .map(|(topic, _)| *topic)
            .unwrap_or(Topic::DEFAULT)
    }
}

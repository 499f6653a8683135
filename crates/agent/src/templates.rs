use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use shelfmate_core::domain::mode::Mode;
use shelfmate_core::domain::topic::Topic;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplatePair {
    pub ack: String,
    pub follow_up: String,
}

impl TemplatePair {
    pub fn new(ack: impl Into<String>, follow_up: impl Into<String>) -> Self {
        Self { ack: ack.into(), follow_up: follow_up.into() }
    }

    pub fn render(&self) -> String {
        format!("{} {}", self.ack, self.follow_up)
    }
}

#[derive(Clone, Debug, Default)]
struct ModeTable {
    topics: BTreeMap<Topic, Vec<TemplatePair>>,
    fallback: Vec<TemplatePair>,
}

/// Canned replies used when no generative backend is configured.
///
/// Lookup for `(mode, topic)` walks, in order: the mode's own topic entry, the adult
/// topic entry, the mode's fallback entry, the adult fallback entry. A mode without a
/// table therefore behaves exactly like adult.
#[derive(Clone, Debug, Default)]
pub struct ResponseTemplateBank {
    tables: BTreeMap<Mode, ModeTable>,
}

type Row = (Option<Topic>, &'static [(&'static str, &'static str)]);

const ADULT_ROWS: &[Row] = &[
    (
        Some(Topic::Healing),
        &[
            ("많이 지치셨겠어요.", "요즘 가장 마음을 무겁게 하는 일은 무엇인가요?"),
            ("그동안 정말 애쓰셨네요.", "스스로에게 쉼을 허락한 게 언제였는지 떠올려 보시겠어요?"),
        ],
    ),
    (
        Some(Topic::Relationship),
        &[
            ("사람 사이의 일은 참 마음을 많이 쓰게 하죠.", "그 상황에서 어떤 감정이 가장 크게 남았나요?"),
            ("속상하셨을 것 같아요.", "상대에게 가장 전하고 싶었던 말은 무엇이었나요?"),
        ],
    ),
    (
        Some(Topic::Growth),
        &[
            ("좋은 일이 있으셨군요.", "그 순간 어떤 점이 가장 기뻤는지 더 들려주시겠어요?"),
            ("이야기만 들어도 기분이 좋아지네요.", "그 경험이 스스로에게 어떤 의미로 남았나요?"),
        ],
    ),
    (
        Some(Topic::Comfort),
        &[("불안한 마음이 드는 건 자연스러운 일이에요.", "그 걱정이 가장 크게 느껴지는 때는 언제인가요?")],
    ),
    (
        Some(Topic::Empathy),
        &[("혼자라는 느낌은 참 무겁게 다가오죠.", "요즘 마음을 나눌 수 있는 사람이 곁에 있나요?")],
    ),
    (
        None,
        &[
            ("그렇군요, 이야기해 주셔서 고마워요.", "조금 더 자세히 들려주시겠어요?"),
            ("말씀 잘 들었어요.", "그때 어떤 마음이 드셨나요?"),
        ],
    ),
];

const TEEN_ROWS: &[Row] = &[
    (Some(Topic::Healing), &[("진짜 많이 지쳤구나.", "요즘 제일 버거운 게 뭐예요?")]),
    (
        Some(Topic::Relationship),
        &[("그런 일이 있었으면 속상했겠다.", "그 친구한테 하고 싶은 말이 있어요?")],
    ),
    (None, &[("오, 그랬구나!", "더 얘기해 줄래요?")]),
];

const CHILD_ROWS: &[Row] = &[
    (Some(Topic::Healing), &[("우와, 많이 힘들었구나.", "오늘은 뭘 하면 기분이 좋아질까?")]),
    (Some(Topic::Growth), &[("우와, 정말 신났겠다!", "제일 재미있었던 건 뭐였어?")]),
    (Some(Topic::Empathy), &[("혼자 있어서 쓸쓸했구나.", "나랑 같이 재미있는 이야기 해볼까?")]),
    (None, &[("그랬구나!", "그 다음엔 어떻게 됐어?")]),
];

const SENIOR_ROWS: &[Row] = &[
    (
        Some(Topic::Healing),
        &[("어르신, 많이 고단하셨지요.", "예전에 힘드실 때는 어떻게 이겨내셨는지 들려주시겠어요?")],
    ),
    (
        Some(Topic::Comfort),
        &[("걱정이 많으셨겠어요, 어르신.", "그 일로 마음이 쓰이신 지는 얼마나 되셨어요?")],
    ),
];

const LAST_RESORT: (&str, &str) = ("그렇군요.", "조금 더 이야기해 주시겠어요?");

impl ResponseTemplateBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut bank = Self::new();
        for (mode, rows) in [
            (Mode::Adult, ADULT_ROWS),
            (Mode::Teen, TEEN_ROWS),
            (Mode::Child, CHILD_ROWS),
            (Mode::Senior, SENIOR_ROWS),
        ] {
            for (topic, pairs) in rows {
                let pairs = pairs.iter().map(|(ack, follow_up)| TemplatePair::new(*ack, *follow_up));
                match topic {
                    Some(topic) => bank.insert(mode, *topic, pairs),
                    None => bank.insert_fallback(mode, pairs),
                }
            }
        }
        bank
    }

    pub fn insert(&mut self, mode: Mode, topic: Topic, pairs: impl IntoIterator<Item = TemplatePair>) {
        self.tables.entry(mode).or_default().topics.entry(topic).or_default().extend(pairs);
    }

    pub fn insert_fallback(&mut self, mode: Mode, pairs: impl IntoIterator<Item = TemplatePair>) {
        self.tables.entry(mode).or_default().fallback.extend(pairs);
    }

    fn candidates(&self, mode: Mode, topic: Topic) -> &[TemplatePair] {
        let own = self.tables.get(&mode);
        let adult = self.tables.get(&Mode::Adult);

        let layers = [
            own.and_then(|table| table.topics.get(&topic)).map(Vec::as_slice),
            adult.and_then(|table| table.topics.get(&topic)).map(Vec::as_slice),
            own.map(|table| table.fallback.as_slice()),
            adult.map(|table| table.fallback.as_slice()),
        ];

        layers.into_iter().flatten().find(|pairs| !pairs.is_empty()).unwrap_or(&[])
    }

    /// Uniform choice among the candidates for `(mode, topic)`.
    pub fn pick<R: Rng + ?Sized>(&self, mode: Mode, topic: Topic, rng: &mut R) -> TemplatePair {
        self.candidates(mode, topic)
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| TemplatePair::new(LAST_RESORT.0, LAST_RESORT.1))
    }

    pub fn reply<R: Rng + ?Sized>(&self, mode: Mode, topic: Topic, rng: &mut R) -> String {
        self.pick(mode, topic, rng).render()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use shelfmate_core::domain::mode::Mode;
    use shelfmate_core::domain::topic::Topic;

    use super::{ResponseTemplateBank, TemplatePair};

    #[test]
    fn mode_specific_entry_wins() {
        let bank = ResponseTemplateBank::builtin();
        let mut rng = StdRng::seed_from_u64(1);
        let pair = bank.pick(Mode::Teen, Topic::Healing, &mut rng);
        assert_eq!(pair, TemplatePair::new("진짜 많이 지쳤구나.", "요즘 제일 버거운 게 뭐예요?"));
        assert_eq!(pair.render(), "진짜 많이 지쳤구나. 요즘 제일 버거운 게 뭐예요?");
    }

    #[test]
    fn missing_topic_inherits_adult_entry_before_mode_fallback() {
        let bank = ResponseTemplateBank::builtin();
        let mut rng = StdRng::seed_from_u64(2);
        let pair = bank.pick(Mode::Teen, Topic::Comfort, &mut rng);
        assert_eq!(pair.ack, "불안한 마음이 드는 건 자연스러운 일이에요.");
    }

    #[test]
    fn topic_unknown_everywhere_uses_the_mode_fallback() {
        let bank = ResponseTemplateBank::builtin();
        let mut rng = StdRng::seed_from_u64(3);
        let pair = bank.pick(Mode::Child, Topic::SelfImprovement, &mut rng);
        assert_eq!(pair.ack, "그랬구나!");
    }

    #[test]
    fn mode_without_fallback_uses_adult_fallback() {
        let bank = ResponseTemplateBank::builtin();
        let mut rng = StdRng::seed_from_u64(4);
        let ack = bank.pick(Mode::Senior, Topic::SelfImprovement, &mut rng).ack;
        assert!(ack == "그렇군요, 이야기해 주셔서 고마워요." || ack == "말씀 잘 들었어요.");
    }

    #[test]
    fn mode_without_any_table_behaves_like_adult() {
        let mut bank = ResponseTemplateBank::new();
        bank.insert(Mode::Adult, Topic::Growth, [TemplatePair::new("좋네요.", "더 들려주세요.")]);
        bank.insert_fallback(Mode::Adult, [TemplatePair::new("그렇군요.", "계속 말씀해 주세요.")]);

        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(bank.reply(Mode::Senior, Topic::Growth, &mut rng), "좋네요. 더 들려주세요.");
        assert_eq!(bank.reply(Mode::Teen, Topic::Empathy, &mut rng), "그렇군요. 계속 말씀해 주세요.");
    }

    #[test]
    fn seeded_rng_makes_selection_repeatable() {
        let bank = ResponseTemplateBank::builtin();
        let picks = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..8).map(|_| bank.reply(Mode::Adult, Topic::Healing, &mut rng)).collect::<Vec<_>>()
        };
        assert_eq!(picks(42), picks(42));
    }

    #[test]
    fn empty_bank_still_answers() {
        let bank = ResponseTemplateBank::new();
        let mut rng = StdRng::seed_from_u64(6);
        assert!(!bank.reply(Mode::Adult, Topic::Healing, &mut rng).is_empty());
    }
}

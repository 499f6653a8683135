use async_trait::async_trait;

use shelfmate_core::domain::book::{BookId, BookRecord};
use shelfmate_core::domain::mode::Mode;
use shelfmate_core::domain::topic::Topic;

use crate::providers::ProviderError;

/// One bibliographic lookup. `exclude` holds titles that must not come back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookQuery {
    pub query: String,
    pub audience: Option<Mode>,
    pub exclude: Vec<String>,
}

impl BookQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Self::default() }
    }

    pub fn for_topic(topic: Topic) -> Self {
        Self::new(topic.label())
    }

    pub fn with_audience(mut self, mode: Mode) -> Self {
        self.audience = Some(mode);
        self
    }

    pub fn excluding(mut self, titles: &[String]) -> Self {
        self.exclude = titles.to_vec();
        self
    }

    pub fn is_excluded(&self, title: &str) -> bool {
        self.exclude.iter().any(|excluded| excluded == title)
    }
}

#[async_trait]
pub trait BookSearch: Send + Sync {
    /// Candidates in preference order; the first one is the best match.
    async fn search(&self, query: &BookQuery) -> Result<Vec<BookRecord>, ProviderError>;
}

struct CatalogEntry {
    id: &'static str,
    title: &'static str,
    author: &'static str,
    publisher: &'static str,
    pub_year: &'static str,
    excerpt: &'static str,
    topics: &'static [Topic],
    for_children: bool,
}

impl CatalogEntry {
    fn to_record(&self) -> BookRecord {
        BookRecord {
            id: BookId(self.id.to_string()),
            title: self.title.to_string(),
            author: self.author.to_string(),
            publisher: self.publisher.to_string(),
            pub_year: self.pub_year.to_string(),
            excerpt: self.excerpt.to_string(),
            cover_image: None,
        }
    }
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        id: "offline-101",
        title: "마음의 안정",
        author: "닥터 힐링",
        publisher: "마음서재",
        pub_year: "2024",
        excerpt: "잠시 멈춰 숨을 고르는 것만으로도 마음은 조금씩 제자리를 찾아갑니다.",
        topics: &[Topic::Healing, Topic::Comfort],
        for_children: false,
    },
    CatalogEntry {
        id: "offline-1",
        title: "어린 왕자",
        author: "앙투안 드 생텍쥐페리",
        publisher: "열린책들",
        pub_year: "2015",
        excerpt: "가장 중요한 것은 눈에 보이지 않아.",
        topics: &[Topic::Empathy, Topic::Comfort, Topic::Healing, Topic::Relationship],
        for_children: true,
    },
    CatalogEntry {
        id: "offline-6",
        title: "강아지똥",
        author: "권정생",
        publisher: "길벗어린이",
        pub_year: "1996",
        excerpt: "나도 어딘가에 꼭 쓰일 데가 있을 거야.",
        topics: &[Topic::Comfort, Topic::Empathy, Topic::Growth],
        for_children: true,
    },
    CatalogEntry {
        id: "offline-7",
        title: "무지개 물고기",
        author: "마르쿠스 피스터",
        publisher: "시공주니어",
        pub_year: "1994",
        excerpt: "반짝이는 비늘을 나누자 친구들이 하나둘 다가왔어요.",
        topics: &[Topic::Relationship, Topic::Empathy, Topic::Growth],
        for_children: true,
    },
    CatalogEntry {
        id: "offline-8",
        title: "미움받을 용기",
        author: "기시미 이치로, 고가 후미타케",
        publisher: "인플루엔셜",
        pub_year: "2014",
        excerpt: "모든 고민은 인간관계에서 비롯된다.",
        topics: &[Topic::Relationship, Topic::SelfImprovement],
        for_children: false,
    },
    CatalogEntry {
        id: "offline-2",
        title: "데미안",
        author: "헤르만 헤세",
        publisher: "민음사",
        pub_year: "2000",
        excerpt: "새는 알에서 나오려고 투쟁한다. 알은 세계이다.",
        topics: &[Topic::Growth, Topic::SelfImprovement],
        for_children: false,
    },
    CatalogEntry {
        id: "offline-3",
        title: "연금술사",
        author: "파울로 코엘료",
        publisher: "문학동네",
        pub_year: "2001",
        excerpt: "무언가를 간절히 원할 때 온 우주는 그 소망이 이루어지도록 도와준다.",
        topics: &[Topic::Growth, Topic::SelfImprovement, Topic::Healing],
        for_children: false,
    },
    CatalogEntry {
        id: "offline-102",
        title: "용기를 내는 법",
        author: "인생 코치",
        publisher: "마음서재",
        pub_year: "2024",
        excerpt: "두려움이 사라지기를 기다리지 말고, 두려움과 함께 한 걸음 내딛어 보세요.",
        topics: &[Topic::Comfort, Topic::Growth, Topic::SelfImprovement],
        for_children: false,
    },
    CatalogEntry {
        id: "offline-4",
        title: "노인과 바다",
        author: "어니스트 헤밍웨이",
        publisher: "민음사",
        pub_year: "2012",
        excerpt: "인간은 파멸할 수는 있어도 패배하지는 않아.",
        topics: &[Topic::Comfort, Topic::Empathy],
        for_children: false,
    },
    CatalogEntry {
        id: "offline-5",
        title: "1984",
        author: "조지 오웰",
        publisher: "민음사",
        pub_year: "2003",
        excerpt: "자유란 2 더하기 2는 4라고 말할 수 있는 자유다.",
        topics: &[Topic::SelfImprovement],
        for_children: false,
    },
];

/// Built-in catalog used when no live recommendation backend is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticCatalog;

impl StaticCatalog {
    pub fn lookup(&self, query: &BookQuery) -> Vec<BookRecord> {
        let children_only = query.audience == Some(Mode::Child);
        let topic = Topic::from_label(query.query.trim());
        let needle = query.query.trim();

        CATALOG
            .iter()
            .filter(|entry| !children_only || entry.for_children)
            .filter(|entry| match topic {
                Some(topic) => entry.topics.contains(&topic),
                None => {
                    needle.is_empty()
                        || entry.title.contains(needle)
                        || entry.author.contains(needle)
                }
            })
            .filter(|entry| !query.is_excluded(entry.title))
            .map(CatalogEntry::to_record)
            .collect()
    }
}

#[async_trait]
impl BookSearch for StaticCatalog {
    async fn search(&self, query: &BookQuery) -> Result<Vec<BookRecord>, ProviderError> {
        Ok(self.lookup(query))
    }
}

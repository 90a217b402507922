use super::timezone::normalize_time;
use super::validation::InputError;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::fmt;

/// 曜日名テーブル（月曜日=0）
pub const WEEKDAY_NAMES: [&str; 7] = [
    "月曜日", "火曜日", "水曜日", "木曜日", "金曜日", "土曜日", "日曜日",
];

/// UTCオフセットの上限（時間）
pub const MAX_OFFSET_HOURS: f64 = 12.0;

/// 配信周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Periodicity {
    /// 毎日
    Daily,
    /// 平日（月〜金）
    Workdays,
    /// 毎週（曜日指定）
    Weekly,
    /// 毎月（日付指定）
    Monthly,
}

impl Periodicity {
    pub const ALL: [Periodicity; 4] = [
        Periodicity::Daily,
        Periodicity::Workdays,
        Periodicity::Weekly,
        Periodicity::Monthly,
    ];

    /// 保存・メニュー値として使うコード
    pub fn as_str(self) -> &'static str {
        match self {
            Periodicity::Daily => "daily",
            Periodicity::Workdays => "workdays",
            Periodicity::Weekly => "weekly",
            Periodicity::Monthly => "monthly",
        }
    }

    /// 表示用ラベル
    pub fn label(self) -> &'static str {
        match self {
            Periodicity::Daily => "毎日",
            Periodicity::Workdays => "平日（月〜金）",
            Periodicity::Weekly => "毎週",
            Periodicity::Monthly => "毎月",
        }
    }

    /// コードから周期を復元する
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == code)
    }

    /// 曜日または日付の指定が必要か
    pub fn requires_anchor(self) -> bool {
        matches!(self, Periodicity::Weekly | Periodicity::Monthly)
    }
}

impl fmt::Display for Periodicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 時:分（0:00〜23:59）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    /// 範囲外の場合は None
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    /// 0:00からの経過分
    pub fn total_minutes(self) -> u16 {
        u16::from(self.hour) * 60 + u16::from(self.minute)
    }

    /// 経過分から復元する。`total` は 1440 未満であること
    pub(crate) fn from_total_minutes(total: u16) -> Self {
        debug_assert!(total < 24 * 60);
        Self {
            hour: (total / 60) as u8,
            minute: (total % 60) as u8,
        }
    }

    /// "HH:MM" 形式の文字列から復元する（選択トークン用）
    pub fn parse_hhmm(text: &str) -> Option<Self> {
        let (hour, minute) = text.split_once(':')?;
        if hour.len() != 2 || minute.len() != 2 {
            return None;
        }
        Self::new(hour.parse().ok()?, minute.parse().ok()?)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// UTCからの時差。分単位で保持し、30分・45分ずれのタイムゾーンも表現できる
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct UtcOffset {
    minutes: i16,
}

impl UtcOffset {
    pub const UTC: UtcOffset = UtcOffset { minutes: 0 };

    /// 時間単位（小数可）から作成する。[-12, +12] の範囲外や非有限値は None
    pub fn from_hours(hours: f64) -> Option<Self> {
        if !hours.is_finite() || hours.abs() > MAX_OFFSET_HOURS {
            return None;
        }
        Some(Self {
            minutes: (hours * 60.0).round() as i16,
        })
    }

    /// 分単位から作成する
    pub fn from_minutes(minutes: i32) -> Option<Self> {
        let limit = (MAX_OFFSET_HOURS as i32) * 60;
        if (-limit..=limit).contains(&minutes) {
            Some(Self {
                minutes: minutes as i16,
            })
        } else {
            None
        }
    }

    pub fn minutes(self) -> i16 {
        self.minutes
    }

    pub fn hours(self) -> f64 {
        f64::from(self.minutes) / 60.0
    }
}

impl fmt::Display for UtcOffset {
    /// "+3"、"-5"、"+5:30" の形式
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minutes < 0 { '-' } else { '+' };
        let abs = self.minutes.unsigned_abs();
        if abs % 60 == 0 {
            write!(f, "{sign}{}", abs / 60)
        } else {
            write!(f, "{sign}{}:{:02}", abs / 60, abs % 60)
        }
    }
}

/// 周期を固定するアンカー（曜日または日付）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Anchor {
    None,
    /// 0〜6（月曜日=0）
    Weekday(u8),
    /// 1〜31
    DayOfMonth(u8),
}

/// 検証済みの配信タイミング定義
///
/// コンストラクタでのみ生成でき、周期とアンカーの整合性、UTC時刻の導出が
/// 常に保証される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecurrenceSpec {
    periodicity: Periodicity,
    anchor: Anchor,
    local_time: ClockTime,
    utc_offset: UtcOffset,
    utc_time: ClockTime,
}

impl RecurrenceSpec {
    /// 配信タイミングを検証して作成する
    ///
    /// # 引数
    /// * `periodicity` - 配信周期
    /// * `anchor` - 曜日/日付（Weekly/Monthly のみ）
    /// * `local_time` - 利用者のローカル時刻
    /// * `utc_offset` - 利用者のUTCオフセット
    ///
    /// # 戻り値
    /// 検証済みの配信タイミング、または整合しない場合は入力エラー
    pub fn new(
        periodicity: Periodicity,
        anchor: Anchor,
        local_time: ClockTime,
        utc_offset: UtcOffset,
    ) -> Result<Self, InputError> {
        match (periodicity, anchor) {
            (Periodicity::Daily | Periodicity::Workdays, Anchor::None) => {}
            (Periodicity::Weekly, Anchor::Weekday(day)) if day <= 6 => {}
            (Periodicity::Weekly, Anchor::Weekday(day)) => {
                return Err(InputError::InvalidWeekday(day.to_string()));
            }
            (Periodicity::Weekly, _) => {
                return Err(InputError::InvalidWeekday(String::new()));
            }
            (Periodicity::Monthly, Anchor::DayOfMonth(day)) if (1..=31).contains(&day) => {}
            (Periodicity::Monthly, Anchor::DayOfMonth(day)) => {
                return Err(InputError::InvalidDayOfMonth(day.to_string()));
            }
            (Periodicity::Monthly, _) => {
                return Err(InputError::InvalidDayOfMonth(String::new()));
            }
            (Periodicity::Daily | Periodicity::Workdays, _) => {
                return Err(InputError::InvalidPeriodicity(periodicity.to_string()));
            }
        }

        Ok(Self {
            periodicity,
            anchor,
            local_time,
            utc_offset,
            utc_time: normalize_time(local_time, utc_offset),
        })
    }

    pub fn periodicity(&self) -> Periodicity {
        self.periodicity
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    pub fn weekday(&self) -> Option<u8> {
        match self.anchor {
            Anchor::Weekday(day) => Some(day),
            _ => None,
        }
    }

    pub fn day_of_month(&self) -> Option<u8> {
        match self.anchor {
            Anchor::DayOfMonth(day) => Some(day),
            _ => None,
        }
    }

    pub fn local_time(&self) -> ClockTime {
        self.local_time
    }

    pub fn utc_offset(&self) -> UtcOffset {
        self.utc_offset
    }

    pub fn utc_time(&self) -> ClockTime {
        self.utc_time
    }

    /// 利用者のローカル日付で配信日に当たるかどうか
    ///
    /// 31日指定など月の日数を超える日付は、その月の末日に寄せる。
    pub fn is_due_on(&self, local_date: NaiveDate) -> bool {
        match self.anchor {
            Anchor::Weekday(day) => {
                local_date.weekday().num_days_from_monday() == u32::from(day)
            }
            Anchor::DayOfMonth(day) => {
                let target = u32::from(day).min(days_in_month(local_date));
                local_date.day() == target
            }
            Anchor::None => match self.periodicity {
                Periodicity::Workdays => local_date.weekday().number_from_monday() <= 5,
                _ => true,
            },
        }
    }
}

/// 指定日を含む月の日数
fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(hour: u8, minute: u8) -> ClockTime {
        ClockTime::new(hour, minute).unwrap()
    }

    fn offset(hours: f64) -> UtcOffset {
        UtcOffset::from_hours(hours).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekly_spec_derives_utc_time() {
        let spec = RecurrenceSpec::new(
            Periodicity::Weekly,
            Anchor::Weekday(2),
            time(9, 0),
            offset(3.0),
        )
        .unwrap();

        assert_eq!(spec.weekday(), Some(2));
        assert_eq!(spec.day_of_month(), None);
        assert_eq!(spec.utc_time(), time(6, 0));
    }

    #[test]
    fn test_anchor_must_match_periodicity() {
        assert!(matches!(
            RecurrenceSpec::new(Periodicity::Weekly, Anchor::None, time(9, 0), UtcOffset::UTC),
            Err(InputError::InvalidWeekday(_))
        ));
        assert!(matches!(
            RecurrenceSpec::new(
                Periodicity::Monthly,
                Anchor::Weekday(1),
                time(9, 0),
                UtcOffset::UTC
            ),
            Err(InputError::InvalidDayOfMonth(_))
        ));
        assert!(matches!(
            RecurrenceSpec::new(
                Periodicity::Daily,
                Anchor::DayOfMonth(3),
                time(9, 0),
                UtcOffset::UTC
            ),
            Err(InputError::InvalidPeriodicity(_))
        ));
        assert!(matches!(
            RecurrenceSpec::new(
                Periodicity::Monthly,
                Anchor::DayOfMonth(32),
                time(9, 0),
                UtcOffset::UTC
            ),
            Err(InputError::InvalidDayOfMonth(_))
        ));
    }

    #[test]
    fn test_clock_time_bounds_and_format() {
        assert!(ClockTime::new(24, 0).is_none());
        assert!(ClockTime::new(23, 60).is_none());
        assert_eq!(time(4, 5).to_string(), "04:05");
        assert_eq!(ClockTime::parse_hhmm("06:00"), Some(time(6, 0)));
        assert_eq!(ClockTime::parse_hhmm("6:00"), None);
        assert_eq!(ClockTime::parse_hhmm("25:00"), None);
    }

    #[test]
    fn test_utc_offset_bounds_and_format() {
        assert!(UtcOffset::from_hours(12.5).is_none());
        assert!(UtcOffset::from_hours(f64::NAN).is_none());
        assert_eq!(offset(5.5).minutes(), 330);
        assert_eq!(offset(3.0).to_string(), "+3");
        assert_eq!(offset(-3.5).to_string(), "-3:30");
        assert_eq!(UtcOffset::UTC.to_string(), "+0");
        assert!(UtcOffset::from_minutes(-721).is_none());
    }

    #[test]
    fn test_is_due_on() {
        let workdays = RecurrenceSpec::new(
            Periodicity::Workdays,
            Anchor::None,
            time(9, 0),
            UtcOffset::UTC,
        )
        .unwrap();
        // 2026-10-16 は金曜日、2026-10-17 は土曜日
        assert!(workdays.is_due_on(date(2026, 10, 16)));
        assert!(!workdays.is_due_on(date(2026, 10, 17)));

        let wednesday = RecurrenceSpec::new(
            Periodicity::Weekly,
            Anchor::Weekday(2),
            time(9, 0),
            UtcOffset::UTC,
        )
        .unwrap();
        assert!(wednesday.is_due_on(date(2026, 10, 14)));
        assert!(!wednesday.is_due_on(date(2026, 10, 15)));
    }

    #[test]
    fn test_monthly_clamps_to_last_day() {
        let day31 = RecurrenceSpec::new(
            Periodicity::Monthly,
            Anchor::DayOfMonth(31),
            time(9, 0),
            UtcOffset::UTC,
        )
        .unwrap();

        assert!(day31.is_due_on(date(2026, 2, 28)));
        assert!(!day31.is_due_on(date(2026, 2, 27)));
        assert!(day31.is_due_on(date(2026, 12, 31)));
        assert!(!day31.is_due_on(date(2026, 12, 30)));
        assert_eq!(days_in_month(date(2028, 2, 10)), 29);
    }

    #[test]
    fn test_periodicity_codes() {
        for periodicity in Periodicity::ALL {
            assert_eq!(Periodicity::from_code(periodicity.as_str()), Some(periodicity));
        }
        assert_eq!(Periodicity::from_code("none"), None);
        assert!(Periodicity::Weekly.requires_anchor());
        assert!(!Periodicity::Workdays.requires_anchor());
    }
}

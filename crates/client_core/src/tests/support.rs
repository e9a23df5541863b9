use chrono::{TimeZone, Utc};
use shared::{
    domain::{
        ChannelId, Member, MemberId, MemberRole, MemberWithProfile, MessageId, MessageWithMember,
        Profile, ProfileId, ServerId,
    },
    protocol::MessagePage,
};

pub(crate) fn message(id: &str, content: &str) -> MessageWithMember {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single().expect("timestamp");
    MessageWithMember {
        id: MessageId::from(id),
        content: content.to_string(),
        file_url: None,
        member_id: MemberId::from("m1"),
        channel_id: ChannelId::from("c1"),
        deleted: false,
        created_at: at,
        updated_at: at,
        member: MemberWithProfile {
            member: Member {
                id: MemberId::from("m1"),
                role: MemberRole::Guest,
                profile_id: ProfileId::from("p1"),
                server_id: ServerId::from("s1"),
            },
            profile: Profile {
                id: ProfileId::from("p1"),
                user_id: "user_1".to_string(),
                name: "alice".to_string(),
                image_url: String::new(),
                email: String::new(),
            },
        },
    }
}

pub(crate) fn page(ids: &[&str], next_cursor: Option<&str>) -> MessagePage {
    MessagePage {
        items: ids.iter().map(|id| message(id, id)).collect(),
        next_cursor: next_cursor.map(MessageId::from),
    }
}

pub(crate) fn ids(page: &MessagePage) -> Vec<&str> {
    page.items.iter().map(|m| m.id.as_str()).collect()
}

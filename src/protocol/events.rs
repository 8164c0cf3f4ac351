use serde::{Deserialize, Serialize};

/// The full protocol event catalog. Names are
/// lowercase and match the wire `event_name` field verbatim; `category`
/// groups them for the webhook payload and for the catalog endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    Connected,
    Disconnected,
    ConnectFailure,
    StreamError,
    StreamReplaced,
    ClientOutdated,
    TemporaryBan,
    LoggedOut,
    KeepAliveTimeout,
    KeepAliveRestored,

    Message,
    Receipt,
    UndecryptableMessage,
    MediaRetry,

    Qr,
    QrScannedWithoutMultidevice,
    PairSuccess,
    PairError,

    Presence,
    ChatPresence,

    CallOffer,
    CallOfferNotice,
    CallAccept,
    CallPreAccept,
    CallReject,
    CallTerminate,
    CallTransport,
    CallRelayLatency,

    GroupInfo,
    JoinedGroup,

    Contact,
    PushName,
    PushNameSetting,
    BusinessName,
    Picture,
    PrivacySettings,
    UserAbout,
    UserStatusMute,

    AppState,
    AppStateSyncComplete,
    HistorySync,
    OfflineSyncPreview,
    OfflineSyncCompleted,

    Archive,
    Pin,
    Star,
    Mute,
    ClearChat,
    DeleteChat,
    MarkChatAsRead,
    UnarchiveChatsSetting,

    NewsletterJoin,
    NewsletterLeave,
    NewsletterLiveUpdate,
    NewsletterMessageMeta,
    NewsletterMuteChange,

    Blocklist,
    BlocklistChange,

    LabelEdit,
    LabelAssociationChat,
    LabelAssociationMessage,

    IdentityChange,

    CatRefreshError,
    PermanentDisconnect,
}

impl EventName {
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::Connected => "connected",
            EventName::Disconnected => "disconnected",
            EventName::ConnectFailure => "connect_failure",
            EventName::StreamError => "stream_error",
            EventName::StreamReplaced => "stream_replaced",
            EventName::ClientOutdated => "client_outdated",
            EventName::TemporaryBan => "temporary_ban",
            EventName::LoggedOut => "logged_out",
            EventName::KeepAliveTimeout => "keep_alive_timeout",
            EventName::KeepAliveRestored => "keep_alive_restored",
            EventName::Message => "message",
            EventName::Receipt => "receipt",
            EventName::UndecryptableMessage => "undecryptable_message",
            EventName::MediaRetry => "media_retry",
            EventName::Qr => "qr",
            EventName::QrScannedWithoutMultidevice => "qr_scanned_without_multidevice",
            EventName::PairSuccess => "pair_success",
            EventName::PairError => "pair_error",
            EventName::Presence => "presence",
            EventName::ChatPresence => "chat_presence",
            EventName::CallOffer => "call_offer",
            EventName::CallOfferNotice => "call_offer_notice",
            EventName::CallAccept => "call_accept",
            EventName::CallPreAccept => "call_pre_accept",
            EventName::CallReject => "call_reject",
            EventName::CallTerminate => "call_terminate",
            EventName::CallTransport => "call_transport",
            EventName::CallRelayLatency => "call_relay_latency",
            EventName::GroupInfo => "group_info",
            EventName::JoinedGroup => "joined_group",
            EventName::Contact => "contact",
            EventName::PushName => "push_name",
            EventName::PushNameSetting => "push_name_setting",
            EventName::BusinessName => "business_name",
            EventName::Picture => "picture",
            EventName::PrivacySettings => "privacy_settings",
            EventName::UserAbout => "user_about",
            EventName::UserStatusMute => "user_status_mute",
            EventName::AppState => "app_state",
            EventName::AppStateSyncComplete => "app_state_sync_complete",
            EventName::HistorySync => "history_sync",
            EventName::OfflineSyncPreview => "offline_sync_preview",
            EventName::OfflineSyncCompleted => "offline_sync_completed",
            EventName::Archive => "archive",
            EventName::Pin => "pin",
            EventName::Star => "star",
            EventName::Mute => "mute",
            EventName::ClearChat => "clear_chat",
            EventName::DeleteChat => "delete_chat",
            EventName::MarkChatAsRead => "mark_chat_as_read",
            EventName::UnarchiveChatsSetting => "unarchive_chats_setting",
            EventName::NewsletterJoin => "newsletter_join",
            EventName::NewsletterLeave => "newsletter_leave",
            EventName::NewsletterLiveUpdate => "newsletter_live_update",
            EventName::NewsletterMessageMeta => "newsletter_message_meta",
            EventName::NewsletterMuteChange => "newsletter_mute_change",
            EventName::Blocklist => "blocklist",
            EventName::BlocklistChange => "blocklist_change",
            EventName::LabelEdit => "label_edit",
            EventName::LabelAssociationChat => "label_association_chat",
            EventName::LabelAssociationMessage => "label_association_message",
            EventName::IdentityChange => "identity_change",
            EventName::CatRefreshError => "cat_refresh_error",
            EventName::PermanentDisconnect => "permanent_disconnect",
        }
    }

    pub fn category(self) -> &'static str {
        use EventName::*;
        match self {
            Connected | Disconnected | ConnectFailure | StreamError | StreamReplaced
            | ClientOutdated | TemporaryBan | LoggedOut | KeepAliveTimeout | KeepAliveRestored => {
                "connection"
            }
            Message | Receipt | UndecryptableMessage | MediaRetry => "messages",
            Qr | QrScannedWithoutMultidevice | PairSuccess | PairError => "authentication",
            Presence | ChatPresence => "presence",
            CallOffer | CallOfferNotice | CallAccept | CallPreAccept | CallReject
            | CallTerminate | CallTransport | CallRelayLatency => "calls",
            GroupInfo | JoinedGroup => "groups",
            Contact | PushName | PushNameSetting | BusinessName | Picture | PrivacySettings
            | UserAbout | UserStatusMute => "config",
            AppState | AppStateSyncComplete | HistorySync | OfflineSyncPreview
            | OfflineSyncCompleted => "app_state",
            Archive | Pin | Star | Mute | ClearChat | DeleteChat | MarkChatAsRead
            | UnarchiveChatsSetting => "chat",
            NewsletterJoin | NewsletterLeave | NewsletterLiveUpdate | NewsletterMessageMeta
            | NewsletterMuteChange => "newsletters",
            Blocklist | BlocklistChange => "blocking",
            LabelEdit | LabelAssociationChat | LabelAssociationMessage => "labels",
            IdentityChange => "identity",
            CatRefreshError | PermanentDisconnect => "errors",
        }
    }

    /// Whether this event is persisted to the Messages table:
    /// `message` and `receipt` do, most others do not.
    pub fn persists_to_messages(self) -> bool {
        matches!(self, EventName::Message | EventName::Receipt)
    }

    pub fn all() -> &'static [EventName] {
        use EventName::*;
        &[
            Connected, Disconnected, ConnectFailure, StreamError, StreamReplaced, ClientOutdated,
            TemporaryBan, LoggedOut, KeepAliveTimeout, KeepAliveRestored, Message, Receipt,
            UndecryptableMessage, MediaRetry, Qr, QrScannedWithoutMultidevice, PairSuccess,
            PairError, Presence, ChatPresence, CallOffer, CallOfferNotice, CallAccept,
            CallPreAccept, CallReject, CallTerminate, CallTransport, CallRelayLatency, GroupInfo,
            JoinedGroup, Contact, PushName, PushNameSetting, BusinessName, Picture,
            PrivacySettings, UserAbout, UserStatusMute, AppState, AppStateSyncComplete,
            HistorySync, OfflineSyncPreview, OfflineSyncCompleted, Archive, Pin, Star, Mute,
            ClearChat, DeleteChat, MarkChatAsRead, UnarchiveChatsSetting, NewsletterJoin,
            NewsletterLeave, NewsletterLiveUpdate, NewsletterMessageMeta, NewsletterMuteChange,
            Blocklist, BlocklistChange, LabelEdit, LabelAssociationChat, LabelAssociationMessage,
            IdentityChange, CatRefreshError, PermanentDisconnect,
        ]
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|e| e.as_str() == name)
    }
}

/// One event as it arrives from a `ProtocolClient`, already carrying the
/// event name tag; `data` is whatever the adapter produced, untouched —
/// adapters must not rewrite or compress events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolEvent {
    pub name: EventName,
    /// Tag identifying the concrete event variant, mirrored into the
    /// webhook payload's `event_type` field.
    pub event_type_tag: String,
    pub data: serde_json::Value,
}

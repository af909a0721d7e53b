mod test_room_routing;
